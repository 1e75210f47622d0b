//! `task_events`: the durable, transactional audit trail.
//! Never read by `claim_next` or the dependency resolver — purely
//! operator-facing history, written in the same transaction as the state
//! change it records so it can never drift from what actually happened.

use sqlx::{Postgres, Transaction};
use taskgraph_core::TaskId;

use crate::error::db;

#[derive(Debug, Clone, Copy)]
pub enum EventKind {
    Submitted,
    Claimed,
    Completed,
    Failed,
    RetryScheduled,
    Cancelled,
    LeaseReclaimed,
}

impl EventKind {
    fn as_str(self) -> &'static str {
        match self {
            EventKind::Submitted => "submitted",
            EventKind::Claimed => "claimed",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::RetryScheduled => "retry_scheduled",
            EventKind::Cancelled => "cancelled",
            EventKind::LeaseReclaimed => "lease_reclaimed",
        }
    }
}

pub async fn record_event(
    tx: &mut Transaction<'_, Postgres>,
    task_id: TaskId,
    kind: EventKind,
    worker_id: Option<&str>,
    lease_epoch: Option<i64>,
    detail: Option<&str>,
) -> taskgraph_core::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO task_events (task_id, event_type, worker_id, lease_epoch, detail, at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(task_id)
    .bind(kind.as_str())
    .bind(worker_id)
    .bind(lease_epoch)
    .bind(detail)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    Ok(())
}
