//! Periodic eviction of finished jobs.
//!
//! Off by default. When a TTL is configured, terminal jobs whose
//! `finished_at` is older than the TTL are dropped from the registry so the
//! store does not grow for the whole life of the process. Artifacts on disk
//! are left alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::store::JobStore;

/// Run the eviction loop until `cancel` is triggered.
pub async fn run(store: Arc<JobStore>, ttl: Duration, interval: Duration, cancel: CancellationToken) {
    let ttl_chrono = match chrono::Duration::from_std(ttl) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, "Job TTL out of range, expiry disabled");
            return;
        }
    };

    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = interval.as_secs(),
        "Job expiry sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job expiry sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = store.evict_terminal_older_than(Utc::now() - ttl_chrono).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Job expiry: evicted finished jobs");
                } else {
                    tracing::debug!("Job expiry: nothing to evict");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::job::JobUpdate;

    use super::*;

    #[tokio::test]
    async fn evicts_finished_jobs_and_stops_on_cancel() {
        let store = Arc::new(JobStore::new());
        let done = store.create().await;
        store
            .update(done.id, JobUpdate::Failed("x".into()))
            .await
            .unwrap();
        let waiting = store.create().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&store),
            Duration::ZERO,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get(done.id).await.is_err());
        assert!(store.get(waiting.id).await.is_ok());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper stops")
            .unwrap();
    }
}
