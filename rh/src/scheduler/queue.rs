//! Bounded job queue shared by the tick loop and the workers

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::SchedulerError;
use crate::repository::FeedRef;

/// A unit of work: fetch and ingest one feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub feed_id: i64,
    pub name: String,
    pub url: String,
}

impl From<FeedRef> for FetchJob {
    fn from(feed: FeedRef) -> Self {
        Self {
            feed_id: feed.id,
            name: feed.name,
            url: feed.url,
        }
    }
}

/// Multi-producer multi-consumer FIFO with a fixed capacity
///
/// `enqueue` waits while the queue is full. Each job is delivered to exactly
/// one `dequeue` caller.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<FetchJob>,
    rx: Arc<Mutex<mpsc::Receiver<FetchJob>>>,
    closed: CancellationToken,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "JobQueue::new: called");
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: CancellationToken::new(),
        }
    }

    /// Add a job, waiting for room when full
    pub async fn enqueue(&self, job: FetchJob) -> Result<(), SchedulerError> {
        debug!(feed_id = job.feed_id, "JobQueue::enqueue: called");
        if self.closed.is_cancelled() {
            return Err(SchedulerError::QueueClosed);
        }
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(SchedulerError::QueueClosed),
            sent = self.tx.send(job) => sent.map_err(|_| SchedulerError::QueueClosed),
        }
    }

    /// Take the next job; `None` once the queue is closed and empty
    pub async fn dequeue(&self) -> Option<FetchJob> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            job = rx.recv() => job,
            () = self.closed.cancelled() => rx.try_recv().ok(),
        }
    }

    /// Stop accepting jobs; queued jobs can still be dequeued
    pub fn close(&self) {
        debug!("JobQueue::close: called");
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Discard queued jobs without processing them, returning how many were dropped
    pub async fn drain(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        debug!(dropped, "JobQueue::drain: done");
        dropped
    }

    /// Number of jobs waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(id: i64) -> FetchJob {
        FetchJob {
            feed_id: id,
            name: format!("feed-{}", id),
            url: format!("http://example.com/{}", id),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::new(10);
        for id in 1..=3 {
            queue.enqueue(job(id)).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        for id in 1..=3 {
            assert_eq!(queue.dequeue().await.unwrap().feed_id, id);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_waits_when_full() {
        let queue = JobQueue::new(1);
        queue.enqueue(job(1)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.enqueue(job(2))).await;
        assert!(blocked.is_err(), "enqueue into a full queue should wait");

        assert_eq!(queue.dequeue().await.unwrap().feed_id, 1);
        tokio::time::timeout(Duration::from_millis(500), queue.enqueue(job(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_each_job_delivered_once() {
        let queue = JobQueue::new(100);
        for id in 0..50 {
            queue.enqueue(job(id)).await.unwrap();
        }
        queue.close();

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = queue.dequeue().await {
                    seen.push(job.feed_id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_enqueue() {
        let queue = JobQueue::new(4);
        queue.enqueue(job(1)).await.unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(queue.enqueue(job(2)).await, Err(SchedulerError::QueueClosed)));
        assert_eq!(queue.dequeue().await.unwrap().feed_id, 1);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = JobQueue::new(4);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_millis(500), consumer).await.unwrap().unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_drain() {
        let queue = JobQueue::new(4);
        queue.enqueue(job(1)).await.unwrap();
        queue.enqueue(job(2)).await.unwrap();
        assert_eq!(queue.drain().await, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity() {
        assert_eq!(JobQueue::new(100).capacity(), 100);
        assert_eq!(JobQueue::new(0).capacity(), 1);
    }
}
