//! Domain types shared by every `QueueStore` backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 64-bit task identity, unique across the whole store.
pub type TaskId = i64;

/// Shared by every task belonging to one pipeline instance.
pub type PipelineId = uuid::Uuid;

/// Stable identity a worker process chooses for itself at startup
/// (host + process + random suffix).
pub type WorkerId = String;

/// A string drawn from a configured, finite set, matched against worker
/// capabilities and the handler registry. The core never interprets its
/// value beyond equality and membership checks.
pub type TaskKind = String;

/// Opaque identifiers naming the document/project a task pertains to.
/// Passed through to the handler; the core never inspects it.
pub type SubjectRef = String;

/// One of the five states a task occupies over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses are permanent for a given task id.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Lease bookkeeping for a task currently `processing`. `None` whenever the
/// task is not leased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub leased_by: WorkerId,
    pub lease_expires_at: DateTime<Utc>,
    /// Monotonic counter of how many times this task row has been leased;
    /// incremented on every `claim_next`. Used to detect stale settle calls
    /// after a lease has been reclaimed by recovery.
    pub lease_epoch: i64,
}

/// The unit of scheduling.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub pipeline_id: Option<PipelineId>,
    pub kind: TaskKind,
    pub subject_ref: SubjectRef,
    pub priority: i32,
    pub status: TaskStatus,
    pub retries: i32,
    pub max_retries: i32,
    pub next_earliest_start: DateTime<Utc>,
    pub lease: Option<Lease>,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub weight: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task is leased iff it is `processing` and its lease has not expired.
    /// A task whose lease *has* expired is awaiting recovery.
    pub fn is_actively_leased(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Processing
            && self
                .lease
                .as_ref()
                .is_some_and(|l| l.lease_expires_at > now)
    }
}

/// A claimed task handed back to a worker by `claim_next`. Distinct from
/// `Task` because a claim always carries a fresh, non-optional lease.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: TaskId,
    pub pipeline_id: Option<PipelineId>,
    pub kind: TaskKind,
    pub subject_ref: SubjectRef,
    pub payload: serde_json::Value,
    pub attempt: i32,
    pub lease_epoch: i64,
    pub lease_expires_at: DateTime<Utc>,
}

/// `(upstream_task_id -> downstream_task_id)`, scoped to one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub upstream_id: TaskId,
    pub downstream_id: TaskId,
}

/// Liveness state of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Draining,
    Dead,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Draining => "draining",
            WorkerStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// A registered executor.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub capabilities: Vec<TaskKind>,
    pub max_concurrent: i32,
    pub status: WorkerStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

/// Optional auxiliary row per task. Purely informational; the
/// scheduler never uses it for control decisions.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub task_id: TaskId,
    /// Clamped 0..=100 by every writer.
    pub percent: i16,
    pub step: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// `fail`'s caller-supplied classification of why a handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClassification {
    Transient,
    Permanent,
}

/// Read-only projection of a task for external callers, returned by `get_task`.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub id: TaskId,
    pub pipeline_id: Option<PipelineId>,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub retries: i32,
    pub max_retries: i32,
    pub priority: i32,
    pub leased_by: Option<WorkerId>,
    pub error: Option<String>,
    pub progress_percent: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
