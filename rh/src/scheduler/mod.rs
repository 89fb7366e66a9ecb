//! Background fetch scheduler
//!
//! A [`Scheduler`] holds the singleton lock for as long as it runs. Each tick
//! it claims the feeds most overdue for a refresh (at most one per worker) and
//! puts one [`FetchJob`] per feed on a bounded [`JobQueue`]. A [`WorkerPool`]
//! of cancellable tasks drains the queue, fetching, decoding and ingesting
//! each feed.
//!
//! The interval and the worker count can change while running: the tick loop
//! re-reads both from the repository every tick, and
//! [`Scheduler::set_workers`] resizes the live pool immediately.

pub mod config;
mod core;
mod error;
mod interval;
mod queue;
mod reconfig;
mod stats;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SchedulerConfig;
pub use self::core::Scheduler;
pub use error::SchedulerError;
pub use interval::parse_interval;
pub use queue::{FetchJob, JobQueue};
pub use stats::SchedulerStats;
pub use worker::WorkerPool;
