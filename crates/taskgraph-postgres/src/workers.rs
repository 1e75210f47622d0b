//! Worker lifecycle state: registration, heartbeats, and the
//! crash-recovery step a worker runs against its own previous incarnation
//! before accepting any new work.

use sqlx::PgPool;
use taskgraph_core::{TaskKind, WorkerStatus};

use crate::error::db;

pub async fn register_worker(
    pool: &PgPool,
    worker_id: &str,
    capabilities: &[TaskKind],
    max_concurrent: i32,
) -> taskgraph_core::Result<()> {
    // Idempotent: a restarted process reusing its stable id updates its
    // row rather than erroring, which is what makes step 2
    // of the worker lifecycle ("recover, then register") retryable.
    sqlx::query(
        r#"
        INSERT INTO workers (id, capabilities, max_concurrent, status, last_heartbeat_at, started_at)
        VALUES ($1, $2, $3, 'active', NOW(), NOW())
        ON CONFLICT (id) DO UPDATE
        SET capabilities = EXCLUDED.capabilities,
            max_concurrent = EXCLUDED.max_concurrent,
            status = 'active',
            last_heartbeat_at = NOW()
        "#,
    )
    .bind(worker_id)
    .bind(capabilities)
    .bind(max_concurrent)
    .execute(pool)
    .await
    .map_err(db)?;

    Ok(())
}

pub async fn heartbeat(pool: &PgPool, worker_id: &str) -> taskgraph_core::Result<()> {
    sqlx::query("UPDATE workers SET last_heartbeat_at = NOW() WHERE id = $1")
        .bind(worker_id)
        .execute(pool)
        .await
        .map_err(db)?;
    Ok(())
}

pub async fn set_worker_status(
    pool: &PgPool,
    worker_id: &str,
    status: WorkerStatus,
) -> taskgraph_core::Result<()> {
    let status_str = match status {
        WorkerStatus::Active => "active",
        WorkerStatus::Draining => "draining",
        WorkerStatus::Dead => "dead",
    };

    sqlx::query("UPDATE workers SET status = $2 WHERE id = $1")
        .bind(worker_id)
        .bind(status_str)
        .execute(pool)
        .await
        .map_err(db)?;
    Ok(())
}

/// Expires every lease this worker id currently holds, without touching
/// retry counters — an expired lease is a lost worker, not a handler
/// failure.
pub async fn expire_own_leases(pool: &PgPool, worker_id: &str) -> taskgraph_core::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'queued',
            leased_by = NULL,
            lease_expires_at = NULL,
            next_earliest_start = NOW()
        WHERE leased_by = $1 AND status = 'processing'
        "#,
    )
    .bind(worker_id)
    .execute(pool)
    .await
    .map_err(db)?;

    Ok(result.rows_affected())
}
