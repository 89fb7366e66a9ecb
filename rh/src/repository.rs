//! Repository port consumed by the scheduler and its workers

use std::sync::Arc;

use async_trait::async_trait;
use feedstore::{FeedStore, NewArticle, StoreError};
use tracing::debug;

/// Result type for repository operations
pub type RepoResult<T> = Result<T, StoreError>;

/// Identifies a pollable feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRef {
    pub id: i64,
    pub name: String,
    pub url: String,
}

impl From<feedstore::Feed> for FeedRef {
    fn from(feed: feedstore::Feed) -> Self {
        Self {
            id: feed.id,
            name: feed.name,
            url: feed.url,
        }
    }
}

/// Storage operations the fetch scheduler depends on
#[async_trait]
pub trait Repository: Send + Sync {
    /// Up to `limit` feeds, most overdue first; each returned feed is marked as just fetched
    async fn claim_due_feeds(&self, limit: usize) -> RepoResult<Vec<FeedRef>>;

    async fn interval(&self) -> RepoResult<String>;

    async fn set_interval(&self, interval: &str) -> RepoResult<()>;

    async fn worker_count(&self) -> RepoResult<usize>;

    async fn set_worker_count(&self, workers: usize) -> RepoResult<()>;

    /// Whether an article with this de-duplication key (its title) is stored
    async fn article_exists(&self, dedup_key: &str) -> RepoResult<bool>;

    async fn insert_article(&self, feed_id: i64, article: &NewArticle) -> RepoResult<()>;

    /// Non-blocking attempt to become the only running poller
    async fn try_acquire_singleton(&self) -> RepoResult<bool>;

    async fn release_singleton(&self) -> RepoResult<()>;
}

/// Repository backed by the SQLite FeedStore
///
/// Store calls run on the blocking pool so a busy database never stalls the
/// tick loop or the workers' runtime threads.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    store: Arc<FeedStore>,
}

impl SqliteRepository {
    pub fn new(store: Arc<FeedStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<FeedStore> {
        &self.store
    }

    async fn blocking<T, F>(&self, op: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FeedStore) -> RepoResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn claim_due_feeds(&self, limit: usize) -> RepoResult<Vec<FeedRef>> {
        debug!(limit, "SqliteRepository::claim_due_feeds: called");
        let feeds = self.blocking(move |store| store.claim_due_feeds(limit)).await?;
        Ok(feeds.into_iter().map(FeedRef::from).collect())
    }

    async fn interval(&self) -> RepoResult<String> {
        self.blocking(|store| store.interval()).await
    }

    async fn set_interval(&self, interval: &str) -> RepoResult<()> {
        let interval = interval.to_string();
        self.blocking(move |store| store.set_interval(&interval)).await
    }

    async fn worker_count(&self) -> RepoResult<usize> {
        self.blocking(|store| store.worker_count()).await
    }

    async fn set_worker_count(&self, workers: usize) -> RepoResult<()> {
        self.blocking(move |store| store.set_worker_count(workers)).await
    }

    async fn article_exists(&self, dedup_key: &str) -> RepoResult<bool> {
        let key = dedup_key.to_string();
        self.blocking(move |store| store.article_exists(&key)).await
    }

    async fn insert_article(&self, feed_id: i64, article: &NewArticle) -> RepoResult<()> {
        let article = article.clone();
        self.blocking(move |store| store.insert_article(feed_id, &article).map(|_| ()))
            .await
    }

    async fn try_acquire_singleton(&self) -> RepoResult<bool> {
        self.blocking(|store| store.try_acquire_singleton()).await
    }

    async fn release_singleton(&self) -> RepoResult<()> {
        self.blocking(|store| store.release_singleton()).await
    }
}
