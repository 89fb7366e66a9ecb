//! Live reconfiguration: poll interval and worker count

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::DEFAULT_INTERVAL;
use super::core::Scheduler;
use super::error::SchedulerError;
use super::interval::parse_interval;

impl Scheduler {
    /// Validate and persist a new poll interval
    ///
    /// An empty string selects the default. A running scheduler adopts the
    /// new period at its next tick.
    pub async fn set_interval(&self, text: &str) -> Result<Duration, SchedulerError> {
        debug!(%text, "Scheduler::set_interval: called");
        let period = parse_interval(text)?;
        let normalized = if text.trim().is_empty() {
            DEFAULT_INTERVAL.to_string()
        } else {
            text.trim().to_string()
        };

        let previous = match self.repo.interval().await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(error = %e, "Scheduler::set_interval: previous interval unreadable");
                None
            }
        };
        self.repo.set_interval(&normalized).await?;
        info!(from = ?previous, to = %normalized, "Poll interval updated");
        Ok(period)
    }

    /// Change the worker count
    ///
    /// On a running scheduler the live pool is resized first, with new workers
    /// spawned under `parent`, and the count is then persisted. Otherwise the
    /// count is only persisted. Out-of-range counts change nothing.
    pub async fn set_workers(&self, count: usize, parent: &CancellationToken) -> Result<(), SchedulerError> {
        debug!(count, "Scheduler::set_workers: called");
        self.pool.validate(count)?;

        let active = self.reconfig.lock().await;
        if active.is_some() {
            self.pool.resize(count, parent).await?;
        } else {
            self.repo.set_worker_count(count).await?;
            info!(workers = count, "Worker count updated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use crate::scheduler::testing::{FakeFetchClient, MemoryRepository, wait_until};
    use std::sync::Arc;

    fn scheduler(repo: Arc<MemoryRepository>) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            repo,
            Arc::new(FakeFetchClient::new()),
            SchedulerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_set_interval_persists_valid_text() {
        let repo = Arc::new(MemoryRepository::new("3m", 3));
        let sched = scheduler(repo.clone());

        assert_eq!(sched.set_interval("45s").await.unwrap(), Duration::from_secs(45));
        assert_eq!(repo.stored_interval(), "45s");
    }

    #[tokio::test]
    async fn test_set_interval_rejects_garbage_without_change() {
        let repo = Arc::new(MemoryRepository::new("3m", 3));
        let sched = scheduler(repo.clone());

        let err = sched.set_interval("not-a-duration").await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval { .. }));
        assert!(!err.is_retryable());
        assert_eq!(repo.stored_interval(), "3m");
        assert_eq!(repo.setting_writes(), 0);
    }

    #[tokio::test]
    async fn test_set_interval_persists_when_previous_value_unreadable() {
        let repo = Arc::new(MemoryRepository::new("3m", 3));
        repo.fail_interval_reads(true);
        let sched = scheduler(repo.clone());

        assert_eq!(sched.set_interval("90s").await.unwrap(), Duration::from_secs(90));
        assert_eq!(repo.stored_interval(), "90s");
        assert_eq!(repo.setting_writes(), 1);
    }

    #[tokio::test]
    async fn test_set_interval_empty_means_default() {
        let repo = Arc::new(MemoryRepository::new("10s", 3));
        let sched = scheduler(repo.clone());

        assert_eq!(sched.set_interval("").await.unwrap(), Duration::from_secs(180));
        assert_eq!(repo.stored_interval(), "3m");
    }

    #[tokio::test]
    async fn test_set_workers_before_start_only_persists() {
        let repo = Arc::new(MemoryRepository::new("3m", 3));
        let sched = scheduler(repo.clone());

        sched.set_workers(7, &CancellationToken::new()).await.unwrap();
        assert_eq!(repo.stored_workers(), 7);
        assert!(sched.worker_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_workers_out_of_range_changes_nothing() {
        let repo = Arc::new(MemoryRepository::new("3m", 3));
        let sched = scheduler(repo.clone());

        for bad in [0, 11] {
            let err = sched.set_workers(bad, &CancellationToken::new()).await.unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidWorkerCount { .. }));
        }
        assert_eq!(repo.stored_workers(), 3);
        assert_eq!(repo.setting_writes(), 0);
    }

    #[tokio::test]
    async fn test_set_workers_resizes_running_pool() {
        let repo = Arc::new(MemoryRepository::new("1h", 3));
        let sched = scheduler(repo.clone());
        let cancel = CancellationToken::new();
        let handle = {
            let sched = Arc::clone(&sched);
            let cancel = cancel.clone();
            tokio::spawn(async move { sched.start(cancel).await })
        };
        assert!(wait_until(Duration::from_secs(1), || repo.lock_held()).await);
        let started = async {
            while sched.active_interval().await.is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), started).await.unwrap();

        for n in [5, 1, 10, 4] {
            sched.set_workers(n, &cancel).await.unwrap();
            assert_eq!(sched.worker_ids().await, (1..=n).collect::<Vec<_>>());
            assert_eq!(repo.stored_workers(), n);
        }

        sched.set_workers(11, &cancel).await.unwrap_err();
        assert_eq!(sched.worker_ids().await, vec![1, 2, 3, 4]);

        let stale = CancellationToken::new();
        stale.cancel();
        let err = sched.set_workers(6, &stale).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ParentCancelled));
        assert_eq!(sched.worker_ids().await, vec![1, 2, 3, 4]);
        assert_eq!(repo.stored_workers(), 4);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(sched.worker_ids().await.is_empty());
    }
}
