//! The `QueueStore` contract — every backend must
//! implement this trait. All other components (Worker Runtime, Control
//! Surface) talk to the store only through these methods; there is no
//! direct-write escape hatch, so invariants stay centrally enforced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    FailureClassification, PipelineId, TaskId, TaskKind, TaskView, WorkerId, WorkerRecord,
};
use crate::progress::PipelineProgress;
use crate::template::PipelineTemplate;

/// Outcome of `claim_next`.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(crate::model::ClaimedTask),
    /// No runnable task matched; the caller must not block.
    None,
}

/// Outcome of `extend_lease`, `complete`, `fail` and `cancel` — every
/// settle-class call can discover that its lease was reclaimed out from
/// under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Ok,
    /// `leased_by`/`lease_epoch` no longer match; another worker (or
    /// recovery) now owns this task. The caller must discard its result.
    Stale,
}

/// Outcome of `fail` specifically, which additionally reports whether the
/// task will be retried or has become terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retried,
    Terminal,
    Stale,
}

/// Per-task queue depth, used by `get_queue_stats`.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub total_queued: i64,
    pub total_processing: i64,
    pub total_completed: i64,
    pub total_failed: i64,
    pub total_cancelled: i64,
    pub oldest_queued_age_seconds: Option<i64>,
    pub depth_by_kind: Vec<(TaskKind, i64)>,
}

/// The single coordination point every other component mutates through.
#[async_trait]
pub trait QueueStore: Send + Sync {
    // ---- Submission interface ----

    async fn submit_pipeline(
        &self,
        template: &PipelineTemplate,
        subject_ref: &str,
        priority: i32,
    ) -> Result<PipelineId>;

    #[allow(clippy::too_many_arguments)]
    async fn submit_task(
        &self,
        kind: &str,
        subject_ref: &str,
        payload: serde_json::Value,
        priority: i32,
        max_retries: i32,
        weight: i32,
    ) -> Result<TaskId>;

    // ---- Lease Engine — the Worker-facing interface ----

    async fn claim_next(
        &self,
        worker_id: &str,
        capabilities: &[TaskKind],
        lease_duration: chrono::Duration,
    ) -> Result<ClaimOutcome>;

    async fn extend_lease(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        new_duration: chrono::Duration,
        progress_percent: Option<i16>,
        progress_step: Option<&str>,
    ) -> Result<SettleOutcome>;

    async fn complete(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        result: serde_json::Value,
    ) -> Result<SettleOutcome>;

    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        error: &str,
        classification: FailureClassification,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome>;

    async fn cancel(&self, task_id: TaskId) -> Result<()>;

    async fn drain(&self, worker_id: &str) -> Result<Vec<TaskId>>;

    // ---- Worker lifecycle ----

    async fn register_worker(
        &self,
        worker_id: &str,
        capabilities: &[TaskKind],
        max_concurrent: i32,
    ) -> Result<()>;

    async fn heartbeat(&self, worker_id: &str) -> Result<()>;

    async fn set_worker_status(
        &self,
        worker_id: &str,
        status: crate::model::WorkerStatus,
    ) -> Result<()>;

    /// Marks every lease this worker id currently holds as immediately
    /// expired, without touching retry counters.
    async fn expire_own_leases(&self, worker_id: &str) -> Result<u64>;

    // ---- Query interface ----

    async fn get_task(&self, task_id: TaskId) -> Result<TaskView>;

    async fn get_pipeline_progress(&self, pipeline_id: PipelineId) -> Result<PipelineProgress>;

    async fn get_queue_stats(&self) -> Result<QueueStats>;

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>>;

    // ---- Recovery Service ----

    /// Runs the three reclaim passes (expired leases, dead workers, stale
    /// retries) in one transaction.
    /// Returns how many leases were reclaimed and how many workers were
    /// newly marked dead, for operator-visible logging.
    async fn run_recovery_cycle(&self, death_threshold: chrono::Duration) -> Result<RecoveryReport>;

    // ---- Control Surface ----

    async fn force_retry(&self, task_id: TaskId) -> Result<()>;

    async fn cancel_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<TaskId>>;
}

/// What one Recovery Service cycle accomplished.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub leases_reclaimed: u64,
    pub workers_marked_dead: u64,
}

impl RecoveryReport {
    pub fn merge(mut self, other: RecoveryReport) -> Self {
        self.leases_reclaimed += other.leases_reclaimed;
        self.workers_marked_dead += other.workers_marked_dead;
        self
    }
}
