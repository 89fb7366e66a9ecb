//! In-memory doubles for scheduler tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedstore::{NewArticle, StoreError};

use crate::fetch::{FetchClient, FetchError};
use crate::repository::{FeedRef, RepoResult, Repository};

#[derive(Default)]
struct MemoryState {
    /// (feed, claim sequence); lower sequence means more overdue
    feeds: Vec<(FeedRef, u64)>,
    claim_seq: u64,
    interval: String,
    workers: usize,
    articles: Vec<(i64, NewArticle)>,
    fail_claims: bool,
    fail_setting_writes: bool,
    fail_interval_reads: bool,
    setting_writes: usize,
}

/// Repository kept in memory; the singleton flag can be shared between instances
pub(crate) struct MemoryRepository {
    state: Mutex<MemoryState>,
    backend_lock: Arc<AtomicBool>,
    holds_lock: AtomicBool,
}

impl MemoryRepository {
    pub(crate) fn new(interval: &str, workers: usize) -> Self {
        Self::with_backend_lock(interval, workers, Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn with_backend_lock(interval: &str, workers: usize, backend_lock: Arc<AtomicBool>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                interval: interval.to_string(),
                workers,
                ..Default::default()
            }),
            backend_lock,
            holds_lock: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_feed(&self, id: i64, name: &str, url: &str) {
        let feed = FeedRef {
            id,
            name: name.to_string(),
            url: url.to_string(),
        };
        self.state().feeds.push((feed, 0));
    }

    pub(crate) fn articles(&self) -> Vec<(i64, NewArticle)> {
        self.state().articles.clone()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.state().articles.iter().map(|(_, a)| a.title.clone()).collect()
    }

    pub(crate) fn stored_interval(&self) -> String {
        self.state().interval.clone()
    }

    pub(crate) fn stored_workers(&self) -> usize {
        self.state().workers
    }

    pub(crate) fn setting_writes(&self) -> usize {
        self.state().setting_writes
    }

    /// Change the persisted worker count behind the scheduler's back
    pub(crate) fn write_workers(&self, workers: usize) {
        self.state().workers = workers;
    }

    pub(crate) fn fail_claims(&self, fail: bool) {
        self.state().fail_claims = fail;
    }

    pub(crate) fn fail_setting_writes(&self, fail: bool) {
        self.state().fail_setting_writes = fail;
    }

    pub(crate) fn fail_interval_reads(&self, fail: bool) {
        self.state().fail_interval_reads = fail;
    }

    pub(crate) fn lock_held(&self) -> bool {
        self.backend_lock.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn claim_due_feeds(&self, limit: usize) -> RepoResult<Vec<FeedRef>> {
        let mut state = self.state();
        if state.fail_claims {
            return Err(StoreError::Unavailable("claims disabled".to_string()));
        }
        state.feeds.sort_by_key(|(feed, seq)| (*seq, feed.id));
        let count = limit.min(state.feeds.len());
        let mut claimed = Vec::with_capacity(count);
        for i in 0..count {
            state.claim_seq += 1;
            let seq = state.claim_seq;
            state.feeds[i].1 = seq;
            claimed.push(state.feeds[i].0.clone());
        }
        Ok(claimed)
    }

    async fn interval(&self) -> RepoResult<String> {
        let state = self.state();
        if state.fail_interval_reads {
            return Err(StoreError::Unavailable("settings unreadable".to_string()));
        }
        Ok(state.interval.clone())
    }

    async fn set_interval(&self, interval: &str) -> RepoResult<()> {
        let mut state = self.state();
        state.interval = interval.to_string();
        state.setting_writes += 1;
        Ok(())
    }

    async fn worker_count(&self) -> RepoResult<usize> {
        Ok(self.state().workers)
    }

    async fn set_worker_count(&self, workers: usize) -> RepoResult<()> {
        let mut state = self.state();
        if state.fail_setting_writes {
            return Err(StoreError::Unavailable("settings read-only".to_string()));
        }
        state.workers = workers;
        state.setting_writes += 1;
        Ok(())
    }

    async fn article_exists(&self, dedup_key: &str) -> RepoResult<bool> {
        let exists = self.state().articles.iter().any(|(_, a)| a.title == dedup_key);
        // Widen the check-then-insert window
        tokio::task::yield_now().await;
        Ok(exists)
    }

    async fn insert_article(&self, feed_id: i64, article: &NewArticle) -> RepoResult<()> {
        self.state().articles.push((feed_id, article.clone()));
        Ok(())
    }

    async fn try_acquire_singleton(&self) -> RepoResult<bool> {
        if self.holds_lock.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let acquired = self
            .backend_lock
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if acquired {
            self.holds_lock.store(true, Ordering::SeqCst);
        }
        Ok(acquired)
    }

    async fn release_singleton(&self) -> RepoResult<()> {
        if self.holds_lock.swap(false, Ordering::SeqCst) {
            self.backend_lock.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Fetch client serving canned documents
#[derive(Default)]
pub(crate) struct FakeFetchClient {
    documents: Mutex<HashMap<String, Result<String, u16>>>,
    delay: Duration,
    fetches: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl FakeFetchClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub(crate) fn serve(&self, url: &str, body: String) {
        self.documents.lock().unwrap().insert(url.to_string(), Ok(body));
    }

    pub(crate) fn fail(&self, url: &str, status: u16) {
        self.documents.lock().unwrap().insert(url.to_string(), Err(status));
    }

    /// URLs in the order their fetch started
    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchClient for FakeFetchClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetches.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let document = self.documents.lock().unwrap().get(url).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match document {
            Some(Ok(body)) => Ok(body.into_bytes()),
            Some(Err(status)) => Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Minimal RSS document with one item per title
pub(crate) fn rss(titles: &[&str]) -> String {
    let items: String = titles
        .iter()
        .map(|t| format!("<item><title>{t}</title><link>http://example.com/{t}</link></item>"))
        .collect();
    format!(r#"<rss version="2.0"><channel><title>test</title>{items}</channel></rss>"#)
}

/// Poll `check` until it holds or `timeout` elapses
pub(crate) async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
