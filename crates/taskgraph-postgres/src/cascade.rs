//! Failure cascade policy: when a task reaches a terminal
//! `failed` or `cancelled` status, every transitive downstream task is
//! cancelled with reason `upstream_failed:<upstream_id>`, in the same
//! transaction that made the upstream terminal.
//!
//! Siblings of a failed task are never cancelled by this pass unless an
//! explicit `task_deps` edge connects them — fan-out branches are
//! independent.

use sqlx::{Postgres, Transaction};
use taskgraph_core::TaskId;

use crate::error::db;
use crate::events::{record_event, EventKind};

pub async fn cascade_cancel_downstream(
    tx: &mut Transaction<'_, Postgres>,
    upstream_id: TaskId,
) -> taskgraph_core::Result<Vec<TaskId>> {
    let reason = format!("upstream_failed:{upstream_id}");

    let cancelled: Vec<(i64,)> = sqlx::query_as(
        r#"
        WITH RECURSIVE affected(id) AS (
            SELECT downstream_id FROM task_deps WHERE upstream_id = $1
            UNION
            SELECT d.downstream_id
            FROM task_deps d
            JOIN affected a ON d.upstream_id = a.id
        )
        UPDATE tasks
        SET status = 'cancelled',
            error = $2,
            finished_at = NOW(),
            leased_by = NULL,
            lease_expires_at = NULL
        FROM affected
        WHERE tasks.id = affected.id
          AND tasks.status NOT IN ('completed', 'failed', 'cancelled')
        RETURNING tasks.id
        "#,
    )
    .bind(upstream_id)
    .bind(&reason)
    .fetch_all(&mut **tx)
    .await
    .map_err(db)?;

    let ids: Vec<TaskId> = cancelled.into_iter().map(|(id,)| id).collect();
    for &id in &ids {
        record_event(tx, id, EventKind::Cancelled, None, None, Some(&reason)).await?;
    }
    Ok(ids)
}
