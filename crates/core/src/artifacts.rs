//! Output artifacts produced by one image-to-3D run.
//!
//! Each run renders three preview videos and exports a textured GLB mesh.
//! The names are the keys clients see in a completed job's `result` map.

use crate::types::OutputFiles;

/// Gaussian splat turntable video.
pub const GAUSSIAN: &str = "gaussian";
/// Radiance field turntable video.
pub const RADIANCE: &str = "radiance";
/// Mesh normal-map turntable video.
pub const MESH: &str = "mesh";
/// Textured mesh export.
pub const GLB: &str = "glb";

/// Every artifact a successful run must produce, with its file name inside
/// the job's output directory.
pub const DECLARED_ARTIFACTS: &[(&str, &str)] = &[
    (GAUSSIAN, "output_gaussian.mp4"),
    (RADIANCE, "output_radiance.mp4"),
    (MESH, "output_mesh.mp4"),
    (GLB, "output.glb"),
];

/// The declared artifacts as an [`OutputFiles`] map of name to file name.
pub fn declared_outputs() -> OutputFiles {
    DECLARED_ARTIFACTS
        .iter()
        .map(|(name, file)| (name.to_string(), file.to_string()))
        .collect()
}

/// Names of declared artifacts absent from `outputs`.
pub fn missing_artifacts(outputs: &OutputFiles) -> Vec<String> {
    DECLARED_ARTIFACTS
        .iter()
        .filter(|(name, _)| !outputs.contains_key(*name))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Build the public URL of an artifact produced by job `job_id`.
///
/// Trailing slashes on `base_url` are ignored so `http://host/` and
/// `http://host` yield the same URL.
pub fn public_url(base_url: &str, job_id: &str, file_name: &str) -> String {
    format!(
        "{}/output/{job_id}/{file_name}",
        base_url.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_outputs_has_every_artifact() {
        let outputs = declared_outputs();
        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs[GLB], "output.glb");
        assert!(missing_artifacts(&outputs).is_empty());
    }

    #[test]
    fn missing_artifacts_lists_absent_names() {
        let mut outputs = declared_outputs();
        outputs.remove(MESH);
        outputs.remove(GAUSSIAN);
        assert_eq!(missing_artifacts(&outputs), vec!["gaussian", "mesh"]);
    }

    #[test]
    fn public_url_trims_trailing_slash() {
        assert_eq!(
            public_url("http://localhost:5000/", "abc", "output.glb"),
            "http://localhost:5000/output/abc/output.glb"
        );
        assert_eq!(
            public_url("http://localhost:5000", "abc", "output.glb"),
            "http://localhost:5000/output/abc/output.glb"
        );
    }
}
