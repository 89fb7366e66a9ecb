//! FeedStore - SQLite persistence for the rsshub poller
//!
//! Stores registered feeds, ingested articles and the poller's runtime
//! settings, and owns the advisory lock that keeps a single poller running
//! against one database.
//!
//! # Layout
//!
//! ```text
//! <data dir>/
//! ├── rsshub.db        # feeds, articles, settings
//! └── rsshub.db.lock   # singleton lock (holder PID inside)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use feedstore::FeedStore;
//!
//! let store = FeedStore::open("rsshub.db")?;
//! store.seed_defaults("3m", 3)?;
//! store.add_feed("TechCrunch", "https://techcrunch.com/feed/")?;
//! let due = store.claim_due_feeds(3)?;
//! ```

mod error;
mod lock;
mod model;
mod store;

pub use error::StoreError;
pub use lock::SingletonLock;
pub use model::{Article, Feed, NewArticle};
pub use store::FeedStore;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Settings key for the poll interval text
pub const INTERVAL_KEY: &str = "interval";

/// Settings key for the worker count
pub const WORKERS_KEY: &str = "workers";
