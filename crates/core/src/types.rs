/// Jobs are identified by random v4 UUIDs, rendered hyphenated on the wire.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Output artifact name mapped to its location (a file name relative to the
/// job's output directory, or a public URL once published).
pub type OutputFiles = std::collections::BTreeMap<String, String>;
