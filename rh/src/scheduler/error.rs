//! Scheduler error types

use feedstore::StoreError;
use thiserror::Error;

/// Errors returned by scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Background fetcher is already running (lock held by another instance)")]
    AlreadyRunning,

    #[error("Worker count must be between {min} and {max}, got {count}")]
    InvalidWorkerCount { count: usize, min: usize, max: usize },

    #[error("Invalid interval {input:?}: {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("Repository error: {0}")]
    Repository(#[from] StoreError),

    #[error("Job queue closed")]
    QueueClosed,

    #[error("Cannot spawn workers under a cancelled token")]
    ParentCancelled,
}

impl SchedulerError {
    /// Start was refused before any work began
    pub fn is_startup_rejection(&self) -> bool {
        matches!(
            self,
            SchedulerError::AlreadyRunning
                | SchedulerError::InvalidWorkerCount { .. }
                | SchedulerError::InvalidInterval { .. }
        )
    }

    /// Check if this error is retryable
    ///
    /// A held lock or an unreachable store may clear up; bad input will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::AlreadyRunning => true,
            SchedulerError::Repository(e) => !e.is_user_error(),
            SchedulerError::InvalidWorkerCount { .. } => false,
            SchedulerError::InvalidInterval { .. } => false,
            SchedulerError::QueueClosed => false,
            SchedulerError::ParentCancelled => false,
        }
    }

    pub(crate) fn invalid_interval(input: &str, reason: impl Into<String>) -> Self {
        SchedulerError::InvalidInterval {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
