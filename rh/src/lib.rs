//! rsshub - background RSS poller
//!
//! Periodically claims the feeds most overdue for a refresh, fetches and
//! decodes them on a pool of workers, and ingests new items into the feed
//! store. The poll interval and the worker count can be changed while the
//! poller runs, and only one poller may run against a store at a time.
//!
//! # Modules
//!
//! - [`scheduler`] - Tick loop, job queue, worker pool, live reconfiguration
//! - [`fetch`] - HTTP fetch client and RSS/Atom decoding
//! - [`repository`] - Storage port used by the scheduler
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod fetch;
pub mod repository;
pub mod scheduler;

// Re-export commonly used types
pub use config::{Config, FetchConfig, StorageConfig};
pub use fetch::{FetchClient, FetchError, HttpFetchClient, ItemRecord};
pub use repository::{FeedRef, Repository, SqliteRepository};
pub use scheduler::{FetchJob, JobQueue, Scheduler, SchedulerConfig, SchedulerError, SchedulerStats, WorkerPool};
