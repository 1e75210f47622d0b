//! Query interface — `get_task`, `get_pipeline_progress`,
//! `get_queue_stats`, `list_workers`. All read-only; the Progress Aggregator
//! is a pure function (`taskgraph_core::aggregate_pipeline_progress`)
//! applied to what these queries fetch.

use sqlx::PgPool;
use taskgraph_core::{
    aggregate_pipeline_progress, PipelineId, PipelineProgress, QueueStats, TaskId, TaskView,
    WorkerRecord,
};

use crate::error::db;
use crate::rows::{TaskProgressRow, TaskViewRow, WorkerRow};

pub async fn get_task(pool: &PgPool, task_id: TaskId) -> taskgraph_core::Result<TaskView> {
    let row: Option<TaskViewRow> = sqlx::query_as(
        r#"
        SELECT
            t.id, t.pipeline_id, t.kind, t.status::text AS status, t.retries,
            t.max_retries, t.priority, t.leased_by, t.error,
            p.percent AS progress_percent, t.created_at, t.started_at, t.finished_at
        FROM tasks t
        LEFT JOIN progress p ON p.task_id = t.id
        WHERE t.id = $1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .map_err(db)?;

    row.map(Into::into)
        .ok_or(taskgraph_core::SchedulerError::NotFound { task_id })
}

pub async fn get_pipeline_progress(
    pool: &PgPool,
    pipeline_id: PipelineId,
) -> taskgraph_core::Result<PipelineProgress> {
    let rows: Vec<TaskProgressRow> = sqlx::query_as(
        r#"
        SELECT t.id, t.kind, t.status::text AS status, t.weight, p.percent AS progress_percent
        FROM tasks t
        LEFT JOIN progress p ON p.task_id = t.id
        WHERE t.pipeline_id = $1
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await
    .map_err(db)?;

    let inputs: Vec<_> = rows.into_iter().map(TaskProgressRow::into_input).collect();
    Ok(aggregate_pipeline_progress(&inputs))
}

pub async fn get_queue_stats(pool: &PgPool) -> taskgraph_core::Result<QueueStats> {
    let totals: (i64, i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'queued'),
            COUNT(*) FILTER (WHERE status = 'processing'),
            COUNT(*) FILTER (WHERE status = 'completed'),
            COUNT(*) FILTER (WHERE status = 'failed'),
            COUNT(*) FILTER (WHERE status = 'cancelled')
        FROM tasks
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(db)?;

    let oldest_queued_age: (Option<f64>,) = sqlx::query_as(
        r#"
        SELECT EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))
        FROM tasks
        WHERE status = 'queued'
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(db)?;

    let depth_by_kind: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT kind, COUNT(*)
        FROM tasks
        WHERE status = 'queued'
        GROUP BY kind
        ORDER BY kind
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db)?;

    Ok(QueueStats {
        total_queued: totals.0,
        total_processing: totals.1,
        total_completed: totals.2,
        total_failed: totals.3,
        total_cancelled: totals.4,
        oldest_queued_age_seconds: oldest_queued_age.0.map(|v| v as i64),
        depth_by_kind,
    })
}

pub async fn list_workers(pool: &PgPool) -> taskgraph_core::Result<Vec<WorkerRecord>> {
    let rows: Vec<WorkerRow> = sqlx::query_as(
        r#"
        SELECT id, capabilities, max_concurrent, status::text AS status,
               last_heartbeat_at, started_at
        FROM workers
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db)?;

    Ok(rows.into_iter().map(Into::into).collect())
}
