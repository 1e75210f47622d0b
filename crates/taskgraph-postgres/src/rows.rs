//! `sqlx::FromRow` projections and their conversions into `taskgraph-core`
//! domain types. Kept separate from the query modules so the SQL reads
//! without type-mapping noise in the middle of it.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use taskgraph_core::{ClaimedTask, TaskStatus, TaskView, WorkerRecord, WorkerStatus};

pub fn parse_status(s: &str) -> TaskStatus {
    match s {
        "queued" => TaskStatus::Queued,
        "processing" => TaskStatus::Processing,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        other => unreachable!("unknown task_status from database: {other}"),
    }
}

pub fn parse_worker_status(s: &str) -> WorkerStatus {
    match s {
        "active" => WorkerStatus::Active,
        "draining" => WorkerStatus::Draining,
        "dead" => WorkerStatus::Dead,
        other => unreachable!("unknown worker_status from database: {other}"),
    }
}

#[derive(FromRow)]
pub struct ClaimedTaskRow {
    pub id: i64,
    pub pipeline_id: Option<uuid::Uuid>,
    pub kind: String,
    pub subject_ref: String,
    pub payload: serde_json::Value,
    pub attempt: i32,
    pub lease_epoch: i64,
    pub lease_expires_at: DateTime<Utc>,
}

impl From<ClaimedTaskRow> for ClaimedTask {
    fn from(r: ClaimedTaskRow) -> Self {
        ClaimedTask {
            id: r.id,
            pipeline_id: r.pipeline_id,
            kind: r.kind,
            subject_ref: r.subject_ref,
            payload: r.payload,
            attempt: r.attempt,
            lease_epoch: r.lease_epoch,
            lease_expires_at: r.lease_expires_at,
        }
    }
}

#[derive(FromRow)]
pub struct TaskViewRow {
    pub id: i64,
    pub pipeline_id: Option<uuid::Uuid>,
    pub kind: String,
    pub status: String,
    pub retries: i32,
    pub max_retries: i32,
    pub priority: i32,
    pub leased_by: Option<String>,
    pub error: Option<String>,
    pub progress_percent: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<TaskViewRow> for TaskView {
    fn from(r: TaskViewRow) -> Self {
        TaskView {
            id: r.id,
            pipeline_id: r.pipeline_id,
            kind: r.kind,
            status: parse_status(&r.status),
            retries: r.retries,
            max_retries: r.max_retries,
            priority: r.priority,
            leased_by: r.leased_by,
            error: r.error,
            progress_percent: r.progress_percent,
            created_at: r.created_at,
            started_at: r.started_at,
            finished_at: r.finished_at,
        }
    }
}

#[derive(FromRow)]
pub struct WorkerRow {
    pub id: String,
    pub capabilities: Vec<String>,
    pub max_concurrent: i32,
    pub status: String,
    pub last_heartbeat_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl From<WorkerRow> for WorkerRecord {
    fn from(r: WorkerRow) -> Self {
        WorkerRecord {
            id: r.id,
            capabilities: r.capabilities,
            max_concurrent: r.max_concurrent,
            status: parse_worker_status(&r.status),
            last_heartbeat_at: r.last_heartbeat_at,
            started_at: r.started_at,
        }
    }
}

#[derive(FromRow)]
pub struct TaskProgressRow {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub weight: i32,
    pub progress_percent: Option<i16>,
}

impl TaskProgressRow {
    pub fn into_input(self) -> taskgraph_core::TaskProgressInput {
        taskgraph_core::TaskProgressInput {
            id: self.id,
            kind: self.kind,
            status: parse_status(&self.status),
            weight: self.weight,
            in_flight_percent: self.progress_percent,
        }
    }
}
