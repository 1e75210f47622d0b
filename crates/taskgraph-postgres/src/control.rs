//! Control Surface — operator-initiated actions taken
//! outside the normal worker lifecycle. `force_retry` deliberately does not
//! touch any downstream task: an operator who
//! wants the rest of the pipeline to move needs the dependency resolver to
//! see this task go back to `completed` on its own, which only happens by
//! actually re-running it.

use sqlx::PgPool;
use taskgraph_core::{PipelineId, TaskId};

use crate::error::db;
use crate::events::{record_event, EventKind};

pub async fn force_retry(pool: &PgPool, task_id: TaskId) -> taskgraph_core::Result<()> {
    let mut tx = pool.begin().await.map_err(db)?;

    let updated = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'queued',
            leased_by = NULL,
            lease_expires_at = NULL,
            next_earliest_start = NOW(),
            error = NULL
        WHERE id = $1 AND status = 'failed'
        "#,
    )
    .bind(task_id)
    .execute(&mut *tx)
    .await
    .map_err(db)?;

    if updated.rows_affected() == 0 {
        tx.rollback().await.map_err(db)?;
        return Err(taskgraph_core::SchedulerError::Conflict(format!(
            "task {task_id} is not in a failed state"
        )));
    }

    record_event(
        &mut tx,
        task_id,
        EventKind::RetryScheduled,
        None,
        None,
        Some("forced by operator"),
    )
    .await?;

    tx.commit().await.map_err(db)?;
    Ok(())
}

/// Cancels every non-terminal task in a pipeline, including tasks not yet
/// reachable from any single failure — unlike the failure
/// cascade, this walks the whole pipeline, not just a task's descendants.
pub async fn cancel_pipeline(
    pool: &PgPool,
    pipeline_id: PipelineId,
) -> taskgraph_core::Result<Vec<TaskId>> {
    let mut tx = pool.begin().await.map_err(db)?;

    let cancelled: Vec<(i64,)> = sqlx::query_as(
        r#"
        UPDATE tasks
        SET status = 'cancelled',
            finished_at = NOW(),
            leased_by = NULL,
            lease_expires_at = NULL
        WHERE pipeline_id = $1
          AND status NOT IN ('completed', 'failed', 'cancelled')
        RETURNING id
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(db)?;

    let ids: Vec<TaskId> = cancelled.into_iter().map(|(id,)| id).collect();
    for &id in &ids {
        record_event(
            &mut tx,
            id,
            EventKind::Cancelled,
            None,
            None,
            Some("cancelled by operator"),
        )
        .await?;
    }

    tx.commit().await.map_err(db)?;
    Ok(ids)
}
