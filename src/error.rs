//! Error types for the task lifecycle engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::store::TaskStatus;

/// Failures of the persistent task dataset.
///
/// Every variant means "the store is unavailable" to callers; none of them
/// is ever used to signal a missing task.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The dataset file does not exist.
    #[error("dataset not found: {}", .0.display())]
    Missing(PathBuf),

    /// The dataset exists but its contents cannot be interpreted.
    #[error("malformed dataset: {0}")]
    Malformed(String),

    /// Reading the dataset failed.
    #[error("cannot read dataset: {0}")]
    Read(String),

    /// Rewriting the dataset failed; the previous contents are left in place.
    #[error("cannot write dataset: {0}")]
    Write(String),

    /// A previous holder of the writer lock panicked.
    #[error("dataset lock poisoned")]
    Poisoned,

    /// The blocking worker running a store operation panicked or was cancelled.
    #[error("store worker interrupted: {0}")]
    Interrupted(String),
}

/// Failures reported by a delivery gateway for a single call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    /// The channel asked us to slow down.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited {
        /// Wait suggested by the channel, if it sent one.
        retry_after: Option<Duration>,
    },

    /// Any other send/edit/delete failure.
    #[error("delivery failed: {0}")]
    Failed(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!("; retry after {}s", wait.as_secs()),
        None => String::new(),
    }
}

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No row carries the requested task id.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The task exists but its current status does not accept the operation.
    #[error("task {task_id} is {status} and cannot be updated")]
    NotActionable {
        /// Task the caller referenced.
        task_id: String,
        /// Status the task was found in.
        status: TaskStatus,
    },

    /// Dataset I/O failure.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// Single delivery attempt failure.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Every delivery attempt for a task failed.
    #[error("delivery of task {task_id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Task that could not be delivered.
        task_id: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the final attempt.
        last_error: DeliveryError,
    },

    /// Archive copy failure.
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Returns `true` when the error means the dataset could not be used.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TaskError>;
