//! PostgreSQL implementation of the taskgraph `QueueStore`.
//!
//! Every operation is a single transaction; concurrency correctness rests
//! on `FOR UPDATE SKIP LOCKED` for claiming and on the `(worker_id,
//! lease_epoch)` staleness check for every settle-class call.
//!
//! # Database Schema
//!
//! See `migrations/0001_init.sql` for the full DDL. In outline:
//!
//! ```sql
//! CREATE TYPE task_status AS ENUM ('queued', 'processing', 'completed', 'failed', 'cancelled');
//! CREATE TYPE worker_status AS ENUM ('active', 'draining', 'dead');
//!
//! CREATE TABLE tasks (
//!     id BIGSERIAL PRIMARY KEY,
//!     pipeline_id UUID,
//!     kind TEXT NOT NULL,
//!     status task_status NOT NULL DEFAULT 'queued',
//!     leased_by TEXT,
//!     lease_epoch BIGINT NOT NULL DEFAULT 0,
//!     lease_expires_at TIMESTAMPTZ,
//!     retries INTEGER NOT NULL DEFAULT 0,
//!     max_retries INTEGER NOT NULL,
//!     priority INTEGER NOT NULL DEFAULT 0,
//!     next_earliest_start TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     payload JSONB NOT NULL,
//!     ...
//! );
//!
//! CREATE TABLE task_deps (upstream_id BIGINT, downstream_id BIGINT, PRIMARY KEY (upstream_id, downstream_id));
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskgraph_postgres::PgQueueStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/taskgraph").await?;
//! let store = PgQueueStore::connect(pool, 1_048_576).await?;
//! ```

mod builder;
mod cascade;
mod control;
mod error;
mod events;
mod lease;
mod query;
mod recovery;
mod rows;
mod workers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use taskgraph_core::{
    ClaimOutcome, FailOutcome, FailureClassification, PipelineId, PipelineProgress,
    PipelineTemplate, QueueStats, QueueStore, RecoveryReport, Result, SettleOutcome, TaskId,
    TaskKind, TaskView, WorkerRecord, WorkerStatus,
};

/// PostgreSQL-backed `QueueStore`.
///
/// `payload_max_bytes` is carried here rather than in the trait signature —
/// it is a deployment-wide limit, not a per-call argument.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
    payload_max_bytes: usize,
    retry_backoff_base_seconds: u64,
    retry_backoff_cap_seconds: u64,
    retry_backoff_jitter_fraction: f64,
}

impl PgQueueStore {
    pub fn new(pool: PgPool, config: &taskgraph_core::SchedulerConfig) -> Self {
        Self {
            pool,
            payload_max_bytes: config.payload_max_bytes,
            retry_backoff_base_seconds: config.retry_backoff_base_seconds,
            retry_backoff_cap_seconds: config.retry_backoff_cap_seconds,
            retry_backoff_jitter_fraction: config.retry_backoff_jitter_fraction,
        }
    }

    /// Runs pending migrations, then wraps the pool.
    pub async fn connect(pool: PgPool, config: &taskgraph_core::SchedulerConfig) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| taskgraph_core::SchedulerError::Database(anyhow::Error::new(e)))?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn submit_pipeline(
        &self,
        template: &PipelineTemplate,
        subject_ref: &str,
        priority: i32,
    ) -> Result<PipelineId> {
        builder::submit_pipeline(
            &self.pool,
            template,
            subject_ref,
            priority,
            self.payload_max_bytes,
        )
        .await
    }

    async fn submit_task(
        &self,
        kind: &str,
        subject_ref: &str,
        payload: serde_json::Value,
        priority: i32,
        max_retries: i32,
        weight: i32,
    ) -> Result<TaskId> {
        builder::submit_task(
            &self.pool,
            kind,
            subject_ref,
            payload,
            priority,
            max_retries,
            weight,
            self.payload_max_bytes,
        )
        .await
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        capabilities: &[TaskKind],
        lease_duration: chrono::Duration,
    ) -> Result<ClaimOutcome> {
        lease::claim_next(
            &self.pool,
            worker_id,
            capabilities,
            lease_duration.num_seconds(),
        )
        .await
    }

    async fn extend_lease(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        new_duration: chrono::Duration,
        progress_percent: Option<i16>,
        progress_step: Option<&str>,
    ) -> Result<SettleOutcome> {
        lease::extend_lease(
            &self.pool,
            task_id,
            worker_id,
            lease_epoch,
            new_duration.num_seconds(),
            progress_percent,
            progress_step,
        )
        .await
    }

    async fn complete(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        result: serde_json::Value,
    ) -> Result<SettleOutcome> {
        lease::complete(&self.pool, task_id, worker_id, lease_epoch, result).await
    }

    async fn fail(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        error: &str,
        classification: FailureClassification,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome> {
        lease::fail(
            &self.pool,
            task_id,
            worker_id,
            lease_epoch,
            error,
            classification,
            now,
            self.retry_backoff_base_seconds,
            self.retry_backoff_cap_seconds,
            self.retry_backoff_jitter_fraction,
        )
        .await
    }

    async fn cancel(&self, task_id: TaskId) -> Result<()> {
        lease::cancel(&self.pool, task_id).await
    }

    async fn drain(&self, worker_id: &str) -> Result<Vec<TaskId>> {
        lease::drain(&self.pool, worker_id).await
    }

    async fn register_worker(
        &self,
        worker_id: &str,
        capabilities: &[TaskKind],
        max_concurrent: i32,
    ) -> Result<()> {
        workers::register_worker(&self.pool, worker_id, capabilities, max_concurrent).await
    }

    async fn heartbeat(&self, worker_id: &str) -> Result<()> {
        workers::heartbeat(&self.pool, worker_id).await
    }

    async fn set_worker_status(&self, worker_id: &str, status: WorkerStatus) -> Result<()> {
        workers::set_worker_status(&self.pool, worker_id, status).await
    }

    async fn expire_own_leases(&self, worker_id: &str) -> Result<u64> {
        workers::expire_own_leases(&self.pool, worker_id).await
    }

    async fn get_task(&self, task_id: TaskId) -> Result<TaskView> {
        query::get_task(&self.pool, task_id).await
    }

    async fn get_pipeline_progress(&self, pipeline_id: PipelineId) -> Result<PipelineProgress> {
        query::get_pipeline_progress(&self.pool, pipeline_id).await
    }

    async fn get_queue_stats(&self) -> Result<QueueStats> {
        query::get_queue_stats(&self.pool).await
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>> {
        query::list_workers(&self.pool).await
    }

    async fn run_recovery_cycle(&self, death_threshold: chrono::Duration) -> Result<RecoveryReport> {
        recovery::run_recovery_cycle(&self.pool, death_threshold.num_seconds()).await
    }

    async fn force_retry(&self, task_id: TaskId) -> Result<()> {
        control::force_retry(&self.pool, task_id).await
    }

    async fn cancel_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<TaskId>> {
        control::cancel_pipeline(&self.pool, pipeline_id).await
    }
}
