//! # taskgraph-core
//!
//! Domain model, the `QueueStore` contract, and the pure logic (backoff,
//! progress aggregation, dependency-cycle checking) shared by every backend
//! and every component of the taskgraph scheduler.
//!
//! taskgraph is the persistent processing-queue core of a distributed
//! document-analysis platform: a PostgreSQL-backed queue, an atomic
//! task-leasing protocol, a dependency engine, worker lifecycle management,
//! retry/backoff, and pipeline-progress aggregation. This crate carries no
//! I/O — see `taskgraph-postgres` for the only shipped backend and
//! `taskgraph-worker` for the runtime that drives handlers against it.
//!
//! ## Key invariants
//!
//! 1. A task is leased iff `status = processing` and its lease has not
//!    expired.
//! 2. Terminal statuses (`completed`, `failed`, `cancelled`) never revert.
//! 3. `retries <= max_retries`, always.
//! 4. Every multi-row state change is one transaction, enforced by the
//!    backend, never composed client-side from smaller calls.
//! 5. The `(worker_id, lease_epoch)` pair is the single source of truth for
//!    "does this caller still own this task" — everything else derives
//!    from it.

pub mod backoff;
pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod progress;
pub mod store;
pub mod template;

pub use backoff::{compute_backoff, compute_backoff_with_system_jitter};
pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use handler::{CancelHandle, CancelSignal, HandlerError, TaskHandler};
pub use model::{
    ClaimedTask, DependencyEdge, FailureClassification, Lease, PipelineId, ProgressRecord,
    SubjectRef, Task, TaskId, TaskKind, TaskStatus, TaskView, WorkerId, WorkerRecord,
    WorkerStatus,
};
pub use progress::{
    aggregate_pipeline_progress, PipelineProgress, TaskProgressEntry, TaskProgressInput,
};
pub use store::{ClaimOutcome, FailOutcome, QueueStats, QueueStore, RecoveryReport, SettleOutcome};
pub use template::{PipelineTemplate, TaskSpec};
