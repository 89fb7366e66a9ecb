//! Resizable worker pool and the per-job fetch-and-ingest body
//!
//! Workers are keyed by id and the live ids are always `1..=len`: growing
//! spawns ids above the current top, shrinking retires the highest ids first.
//! Every worker runs on a child token of the parent it was spawned with, so a
//! scheduler shutdown stops all of them while a resize stops only the retired
//! ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use feedstore::NewArticle;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{MIN_WORKERS, SchedulerConfig};
use super::error::SchedulerError;
use super::queue::{FetchJob, JobQueue};
use super::stats::StatsRecorder;
use crate::fetch::{FetchClient, ItemRecord, parse_published_at};
use crate::repository::Repository;

/// Everything a worker needs to process jobs
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) repo: Arc<dyn Repository>,
    pub(crate) client: Arc<dyn FetchClient>,
    pub(crate) queue: JobQueue,
    /// Serializes check-then-insert across the pool
    pub(crate) ingest_lock: Arc<Mutex<()>>,
    pub(crate) stats: Arc<StatsRecorder>,
}

/// One live worker task
#[derive(Debug)]
struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Result of ingesting one decoded item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IngestOutcome {
    Inserted,
    Skipped,
    Failed,
}

/// Runtime-resizable set of fetch workers
pub struct WorkerPool {
    ctx: WorkerContext,
    config: SchedulerConfig,
    workers: Mutex<BTreeMap<usize, WorkerHandle>>,
    /// Retired workers still finishing their current job
    retiring: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(ctx: WorkerContext, config: &SchedulerConfig) -> Self {
        debug!(max_workers = config.max_workers, "WorkerPool::new: called");
        Self {
            ctx,
            config: config.clone(),
            workers: Mutex::new(BTreeMap::new()),
            retiring: Mutex::new(Vec::new()),
        }
    }

    /// Check a requested pool size against the allowed range
    pub fn validate(&self, count: usize) -> Result<(), SchedulerError> {
        if self.config.worker_count_in_range(count) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidWorkerCount {
                count,
                min: MIN_WORKERS,
                max: self.config.max_workers,
            })
        }
    }

    /// Validate, resize the live pool, then persist the new count
    ///
    /// An out-of-range count or an already cancelled `parent` is rejected
    /// before anything changes. If persisting fails the pool is put back to
    /// its previous size.
    pub async fn resize(&self, new_count: usize, parent: &CancellationToken) -> Result<(), SchedulerError> {
        debug!(new_count, "WorkerPool::resize: called");
        self.validate(new_count)?;
        if parent.is_cancelled() {
            return Err(SchedulerError::ParentCancelled);
        }

        let old_count = self.apply(new_count, parent).await;
        if let Err(e) = self.ctx.repo.set_worker_count(new_count).await {
            warn!(error = %e, from = new_count, to = old_count, "Failed to persist worker count, rolling back");
            self.apply(old_count, parent).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Grow or shrink to exactly `new_count` live workers, returning the previous size
    pub(crate) async fn apply(&self, new_count: usize, parent: &CancellationToken) -> usize {
        let mut workers = self.workers.lock().await;
        let old_count = workers.len();

        if new_count > old_count {
            for id in old_count + 1..=new_count {
                workers.insert(id, self.spawn(id, parent));
            }
        } else if new_count < old_count {
            let mut retired = Vec::with_capacity(old_count - new_count);
            for id in (new_count + 1..=old_count).rev() {
                if let Some(handle) = workers.remove(&id) {
                    debug!(worker_id = id, "WorkerPool::apply: retiring worker");
                    handle.cancel.cancel();
                    retired.push(handle.task);
                }
            }
            let mut retiring = self.retiring.lock().await;
            retiring.retain(|task| !task.is_finished());
            retiring.extend(retired);
        }

        if new_count != old_count {
            info!(from = old_count, to = new_count, "Worker pool resized");
        }
        old_count
    }

    /// Start worker `id` on a child token of `parent`
    fn spawn(&self, id: usize, parent: &CancellationToken) -> WorkerHandle {
        debug!(worker_id = id, "WorkerPool::spawn: called");
        let cancel = parent.child_token();
        let task = tokio::spawn(run_worker(id, self.ctx.clone(), cancel.clone()));
        WorkerHandle { cancel, task }
    }

    /// Number of live workers
    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }

    /// Ids of the live workers, ascending
    pub async fn live_ids(&self) -> Vec<usize> {
        self.workers.lock().await.keys().copied().collect()
    }

    /// Cancel every worker and wait for each to finish its current job
    pub async fn shutdown(&self) {
        debug!("WorkerPool::shutdown: called");
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles.values() {
            handle.cancel.cancel();
        }

        let mut tasks: Vec<JoinHandle<()>> = handles.into_values().map(|h| h.task).collect();
        tasks.extend(self.retiring.lock().await.drain(..));

        let count = tasks.len();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!(workers = count, "Worker pool stopped");
    }
}

/// Worker loop: take jobs until cancelled or the queue closes
async fn run_worker(id: usize, ctx: WorkerContext, cancel: CancellationToken) {
    info!(worker_id = id, "Worker started");
    loop {
        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = ctx.queue.dequeue() => job,
        };
        let Some(job) = job else {
            debug!(worker_id = id, "run_worker: job queue closed");
            break;
        };
        // A dequeued job runs to completion; cancellation is checked between jobs
        process_job(id, &ctx, &job).await;
    }
    info!(worker_id = id, "Worker stopped");
}

/// Fetch, decode and ingest one feed; failures are logged and the job dropped
pub(crate) async fn process_job(worker_id: usize, ctx: &WorkerContext, job: &FetchJob) {
    debug!(worker_id, feed_id = job.feed_id, url = %job.url, "process_job: called");

    let bytes = match ctx.client.fetch(&job.url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(
                worker_id,
                feed = %job.name,
                url = %job.url,
                transient = e.is_transient(),
                error = %e,
                "Failed to fetch feed"
            );
            ctx.stats.record_fetch_failure();
            return;
        }
    };

    let items = match ctx.client.decode(&bytes) {
        Ok(items) => items,
        Err(e) => {
            warn!(worker_id, feed = %job.name, url = %job.url, error = %e, "Failed to decode feed");
            ctx.stats.record_fetch_failure();
            return;
        }
    };

    let total = items.len();
    let mut inserted = 0;
    for item in items {
        if ingest_item(ctx, job.feed_id, item).await == IngestOutcome::Inserted {
            inserted += 1;
        }
    }

    ctx.stats.record_processed();
    info!(worker_id, feed = %job.name, items = total, inserted, "Processed feed");
}

/// Store one item unless an article with the same title already exists
pub(crate) async fn ingest_item(ctx: &WorkerContext, feed_id: i64, item: ItemRecord) -> IngestOutcome {
    let article = NewArticle {
        published_at: parse_published_at(&item.published_at_text),
        title: item.title,
        link: item.link,
        description: item.description,
    };

    let _guard = ctx.ingest_lock.lock().await;
    match ctx.repo.article_exists(&article.title).await {
        Ok(true) => {
            debug!(feed_id, title = %article.title, "ingest_item: already stored");
            ctx.stats.record_skipped();
            IngestOutcome::Skipped
        }
        Ok(false) => match ctx.repo.insert_article(feed_id, &article).await {
            Ok(()) => {
                ctx.stats.record_inserted();
                IngestOutcome::Inserted
            }
            Err(e) => {
                warn!(feed_id, title = %article.title, error = %e, "Failed to insert article");
                ctx.stats.record_failed();
                IngestOutcome::Failed
            }
        },
        Err(e) => {
            warn!(feed_id, title = %article.title, error = %e, "Failed to check article");
            ctx.stats.record_failed();
            IngestOutcome::Failed
        }
    }
}
