//! Pipeline Builder — instantiates a DAG of tasks from a
//! template in one transaction. Validates the template in-memory first
//! (cycle/undefined-upstream checks never touch the database) so a bad
//! template is rejected atomically with no partial writes.

use sqlx::PgPool;
use taskgraph_core::{PipelineId, PipelineTemplate, TaskId};

use crate::error::db;
use crate::events::{record_event, EventKind};

pub async fn submit_pipeline(
    pool: &PgPool,
    template: &PipelineTemplate,
    subject_ref: &str,
    priority: i32,
    payload_max_bytes: usize,
) -> taskgraph_core::Result<PipelineId> {
    template.validate()?;

    for spec in &template.tasks {
        let size = serde_json::to_vec(&spec.payload).map(|v| v.len()).unwrap_or(0);
        if size > payload_max_bytes {
            return Err(taskgraph_core::SchedulerError::PayloadTooLarge {
                size,
                max: payload_max_bytes,
            });
        }
    }

    let pipeline_id = uuid::Uuid::new_v4();
    let mut tx = pool.begin().await.map_err(db)?;

    // kind -> id, populated as each task spec is inserted, so depends_on
    // can be translated to upstream-id edges.
    let mut ids_by_kind = std::collections::HashMap::with_capacity(template.tasks.len());

    for spec in &template.tasks {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO tasks
                (pipeline_id, kind, subject_ref, priority, status, retries,
                 max_retries, next_earliest_start, payload, weight, created_at)
            VALUES
                ($1, $2, $3, $4, 'queued', 0, $5, NOW(), $6, $7, NOW())
            RETURNING id
            "#,
        )
        .bind(pipeline_id)
        .bind(&spec.kind)
        .bind(subject_ref)
        .bind(priority)
        .bind(spec.max_retries)
        .bind(&spec.payload)
        .bind(spec.weight)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;

        ids_by_kind.insert(spec.kind.clone(), id);
        record_event(&mut tx, id, EventKind::Submitted, None, None, None).await?;
    }

    for spec in &template.tasks {
        let downstream_id = ids_by_kind[&spec.kind];
        for upstream_kind in &spec.depends_on {
            let upstream_id = ids_by_kind[upstream_kind];
            sqlx::query(
                "INSERT INTO task_deps (upstream_id, downstream_id) VALUES ($1, $2)",
            )
            .bind(upstream_id)
            .bind(downstream_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }
    }

    tx.commit().await.map_err(db)?;
    Ok(pipeline_id)
}

pub async fn submit_task(
    pool: &PgPool,
    kind: &str,
    subject_ref: &str,
    payload: serde_json::Value,
    priority: i32,
    max_retries: i32,
    weight: i32,
    payload_max_bytes: usize,
) -> taskgraph_core::Result<TaskId> {
    let size = serde_json::to_vec(&payload).map(|v| v.len()).unwrap_or(0);
    if size > payload_max_bytes {
        return Err(taskgraph_core::SchedulerError::PayloadTooLarge {
            size,
            max: payload_max_bytes,
        });
    }

    let mut tx = pool.begin().await.map_err(db)?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tasks
            (pipeline_id, kind, subject_ref, priority, status, retries,
             max_retries, next_earliest_start, payload, weight, created_at)
        VALUES
            (NULL, $1, $2, $3, 'queued', 0, $4, NOW(), $5, $6, NOW())
        RETURNING id
        "#,
    )
    .bind(kind)
    .bind(subject_ref)
    .bind(priority)
    .bind(max_retries)
    .bind(&payload)
    .bind(weight)
    .fetch_one(&mut *tx)
    .await
    .map_err(db)?;

    record_event(&mut tx, id, EventKind::Submitted, None, None, None).await?;
    tx.commit().await.map_err(db)?;
    Ok(id)
}
