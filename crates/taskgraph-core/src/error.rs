//! Error taxonomy shared by every backend and consumer of the scheduler.
//!
//! `SchedulerError` is the only error type that crosses the `QueueStore`
//! trait boundary — backends translate their own errors (e.g. `sqlx::Error`)
//! into it so callers never need to know which storage engine is in use.

use crate::model::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The backing store failed in a way that carries no scheduler-level
    /// meaning (connection loss, constraint violation, etc). Wrapped
    /// opaquely so `taskgraph-core` never depends on a specific driver.
    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("task {task_id} not found")]
    NotFound { task_id: TaskId },

    #[error("worker {worker_id} not found")]
    WorkerNotFound { worker_id: String },

    /// A pipeline template's dependency graph contains a cycle. Rejected
    /// atomically at submission.
    #[error("pipeline template contains a dependency cycle")]
    CycleDetected,

    /// A task specification names an upstream kind that no task in the
    /// same template defines.
    #[error("task spec names undefined upstream kind: {kind}")]
    UndefinedUpstream { kind: String },

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested state transition conflicts with the task's current
    /// state (e.g. force-retry on a task that isn't terminal yet).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl SchedulerError {
    /// Maps onto the administrative CLI's process exit codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchedulerError::InvalidArgument(_)
            | SchedulerError::CycleDetected
            | SchedulerError::UndefinedUpstream { .. }
            | SchedulerError::PayloadTooLarge { .. } => 2,
            SchedulerError::NotFound { .. } | SchedulerError::WorkerNotFound { .. } => 3,
            SchedulerError::Conflict(_) => 4,
            SchedulerError::Database(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
