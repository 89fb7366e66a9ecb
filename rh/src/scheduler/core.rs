//! Scheduler implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::interval::parse_interval;
use super::queue::{FetchJob, JobQueue};
use super::stats::{SchedulerStats, StatsRecorder};
use super::worker::{WorkerContext, WorkerPool};
use crate::fetch::FetchClient;
use crate::repository::Repository;

/// The Scheduler owns the tick loop, the job queue and the worker pool for
/// one poller, and holds the singleton lock while it runs.
pub struct Scheduler {
    pub(super) repo: Arc<dyn Repository>,
    queue: JobQueue,
    pub(super) pool: WorkerPool,
    /// Active tick period, `None` while not running; also guards ticker swaps
    /// against pool resizes
    pub(super) reconfig: Mutex<Option<Duration>>,
    stats: Arc<StatsRecorder>,
    running: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler over the given repository and fetch client
    pub fn new(repo: Arc<dyn Repository>, client: Arc<dyn FetchClient>, config: SchedulerConfig) -> Self {
        debug!(?config, "Scheduler::new: called");
        let queue = JobQueue::new(config.queue_capacity);
        let stats = Arc::new(StatsRecorder::default());
        let ctx = WorkerContext {
            repo: Arc::clone(&repo),
            client,
            queue: queue.clone(),
            ingest_lock: Arc::new(Mutex::new(())),
            stats: Arc::clone(&stats),
        };
        let pool = WorkerPool::new(ctx, &config);

        Self {
            repo,
            queue,
            pool,
            reconfig: Mutex::new(None),
            stats,
            running: AtomicBool::new(false),
        }
    }

    /// Run the poller until `cancel` fires or a fatal error occurs
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] without spawning workers when
    /// another instance holds the singleton lock. Once the lock is held, it is
    /// released on every exit path after the workers have stopped.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        debug!("Scheduler::start: called");
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scheduler::start: this scheduler is already running");
            return Err(SchedulerError::AlreadyRunning);
        }

        let result = self.run_singleton(&cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_singleton(&self, cancel: &CancellationToken) -> Result<(), SchedulerError> {
        if !self.repo.try_acquire_singleton().await? {
            warn!("Another instance holds the fetcher lock");
            return Err(SchedulerError::AlreadyRunning);
        }

        let result = self.run(cancel).await;
        self.stop_workers().await;

        if let Err(e) = self.repo.release_singleton().await {
            warn!(error = %e, "Failed to release fetcher lock");
            if result.is_ok() {
                return Err(e.into());
            }
        }

        match &result {
            Ok(()) => info!("Background fetcher stopped"),
            Err(e) => warn!(error = %e, "Background fetcher stopped with error"),
        }
        result
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<(), SchedulerError> {
        let interval_text = self.repo.interval().await?;
        let period = parse_interval(&interval_text)?;
        let workers = self.repo.worker_count().await?;
        self.pool.validate(workers)?;

        {
            let mut active = self.reconfig.lock().await;
            self.pool.apply(workers, cancel).await;
            *active = Some(period);
        }
        info!(interval = ?period, workers, "Background fetcher started");

        let mut ticker = new_ticker(period);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = ticker.tick() => self.tick(&mut ticker, cancel).await?,
            }
        }
    }

    /// One tick: adopt persisted settings, claim due feeds, enqueue them
    async fn tick(&self, ticker: &mut Interval, cancel: &CancellationToken) -> Result<(), SchedulerError> {
        debug!("Scheduler::tick: called");
        self.stats.record_tick();
        self.refresh_interval(ticker).await;
        self.refresh_workers(cancel).await;

        let limit = self.pool.len().await;
        let feeds = self.repo.claim_due_feeds(limit).await?;
        if feeds.is_empty() {
            debug!("Scheduler::tick: no feeds due");
            self.stats.record_enqueued(Vec::new());
            return Ok(());
        }

        let mut enqueued = Vec::with_capacity(feeds.len());
        for feed in feeds {
            let id = feed.id;
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Scheduler::tick: cancelled while enqueuing");
                    break;
                }
                sent = self.queue.enqueue(FetchJob::from(feed)) => sent?,
            }
            enqueued.push(id);
        }

        info!(feed_ids = ?enqueued, "Enqueued due feeds");
        self.stats.record_enqueued(enqueued);
        Ok(())
    }

    /// Swap the ticker when the persisted interval differs from the active one
    async fn refresh_interval(&self, ticker: &mut Interval) {
        let text = match self.repo.interval().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to read interval, keeping current");
                return;
            }
        };
        let period = match parse_interval(&text) {
            Ok(period) => period,
            Err(e) => {
                warn!(error = %e, "Ignoring persisted interval");
                return;
            }
        };

        let mut active = self.reconfig.lock().await;
        if *active != Some(period) {
            *ticker = new_ticker(period);
            info!(from = ?*active, to = ?period, "Poll interval changed");
            *active = Some(period);
        }
    }

    /// Apply a persisted worker count changed elsewhere (e.g. another process)
    async fn refresh_workers(&self, cancel: &CancellationToken) {
        let _active = self.reconfig.lock().await;
        let desired = match self.repo.worker_count().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to read worker count, keeping current");
                return;
            }
        };
        if let Err(e) = self.pool.validate(desired) {
            warn!(error = %e, "Ignoring persisted worker count");
            return;
        }
        if self.pool.len().await != desired {
            self.pool.apply(desired, cancel).await;
        }
    }

    /// Stop and await all workers, then drop jobs nobody will take
    async fn stop_workers(&self) {
        *self.reconfig.lock().await = None;
        self.pool.shutdown().await;
        let dropped = self.queue.drain().await;
        if dropped > 0 {
            debug!(dropped, "Scheduler::stop_workers: discarded queued jobs");
        }
    }

    /// Tick period in effect, `None` when not running
    pub async fn active_interval(&self) -> Option<Duration> {
        *self.reconfig.lock().await
    }

    /// Ids of the live workers
    pub async fn worker_ids(&self) -> Vec<usize> {
        self.pool.live_ids().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }
}

/// First fire one period from now
fn new_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
