//! Lease Engine — `claim_next`, `extend_lease`, `complete`,
//! `fail`, `cancel`, `drain`. Each is a single transaction; concurrency
//! correctness rests on `FOR UPDATE SKIP LOCKED` (no two callers ever see
//! the same candidate row) plus the `(worker_id, lease_epoch)` staleness
//! check (a worker whose lease has been reclaimed cannot silently overwrite
//! state).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use taskgraph_core::{
    ClaimOutcome, FailOutcome, FailureClassification, SettleOutcome, TaskId, TaskKind,
};

use crate::cascade::cascade_cancel_downstream;
use crate::error::db;
use crate::events::{record_event, EventKind};
use crate::rows::ClaimedTaskRow;

pub async fn claim_next(
    pool: &PgPool,
    worker_id: &str,
    capabilities: &[TaskKind],
    lease_duration_seconds: i64,
) -> taskgraph_core::Result<ClaimOutcome> {
    if capabilities.is_empty() {
        return Ok(ClaimOutcome::None);
    }

    let mut tx = pool.begin().await.map_err(db)?;

    // NOT EXISTS over task_deps joined with tasks is the Dependency
    // Resolver — expressed inline, stateless, always
    // consistent with the source of truth.
    let row = sqlx::query_as::<_, ClaimedTaskRow>(
        r#"
        WITH candidate AS (
            SELECT t.id
            FROM tasks t
            WHERE t.status = 'queued'
              AND t.kind = ANY($1)
              AND t.next_earliest_start <= NOW()
              AND NOT EXISTS (
                  SELECT 1
                  FROM task_deps d
                  JOIN tasks u ON u.id = d.upstream_id
                  WHERE d.downstream_id = t.id
                    AND u.status <> 'completed'
              )
            ORDER BY t.priority DESC, t.created_at ASC, t.id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE tasks
        SET status = 'processing',
            leased_by = $2,
            lease_expires_at = NOW() + make_interval(secs => $3),
            started_at = COALESCE(started_at, NOW()),
            lease_epoch = lease_epoch + 1
        FROM candidate
        WHERE tasks.id = candidate.id
        RETURNING
            tasks.id,
            tasks.pipeline_id,
            tasks.kind,
            tasks.subject_ref,
            tasks.payload,
            tasks.retries + 1 AS attempt,
            tasks.lease_epoch,
            tasks.lease_expires_at
        "#,
    )
    .bind(capabilities)
    .bind(worker_id)
    .bind(lease_duration_seconds as f64)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db)?;

    let Some(row) = row else {
        tx.rollback().await.map_err(db)?;
        return Ok(ClaimOutcome::None);
    };

    let claimed: taskgraph_core::ClaimedTask = row.into();
    record_event(
        &mut tx,
        claimed.id,
        EventKind::Claimed,
        Some(worker_id),
        Some(claimed.lease_epoch),
        None,
    )
    .await?;

    tx.commit().await.map_err(db)?;
    Ok(ClaimOutcome::Claimed(claimed))
}

pub async fn extend_lease(
    pool: &PgPool,
    task_id: TaskId,
    worker_id: &str,
    lease_epoch: i64,
    new_duration_seconds: i64,
    progress_percent: Option<i16>,
    progress_step: Option<&str>,
) -> taskgraph_core::Result<SettleOutcome> {
    let mut tx = pool.begin().await.map_err(db)?;

    let updated = sqlx::query(
        r#"
        UPDATE tasks
        SET lease_expires_at = NOW() + make_interval(secs => $4)
        WHERE id = $1
          AND leased_by = $2
          AND lease_epoch = $3
          AND status = 'processing'
        "#,
    )
    .bind(task_id)
    .bind(worker_id)
    .bind(lease_epoch)
    .bind(new_duration_seconds as f64)
    .execute(&mut *tx)
    .await
    .map_err(db)?;

    if updated.rows_affected() == 0 {
        tx.rollback().await.map_err(db)?;
        return Ok(SettleOutcome::Stale);
    }

    if let Some(percent) = progress_percent {
        let clamped = percent.clamp(0, 99);
        sqlx::query(
            r#"
            INSERT INTO progress (task_id, percent, step, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (task_id) DO UPDATE
            SET percent = EXCLUDED.percent,
                step = EXCLUDED.step,
                updated_at = NOW()
            "#,
        )
        .bind(task_id)
        .bind(clamped)
        .bind(progress_step)
        .execute(&mut *tx)
        .await
        .map_err(db)?;
    }

    tx.commit().await.map_err(db)?;
    Ok(SettleOutcome::Ok)
}

pub async fn complete(
    pool: &PgPool,
    task_id: TaskId,
    worker_id: &str,
    lease_epoch: i64,
    result: serde_json::Value,
) -> taskgraph_core::Result<SettleOutcome> {
    let mut tx = pool.begin().await.map_err(db)?;

    let updated = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'completed',
            finished_at = NOW(),
            result = $4,
            leased_by = NULL,
            lease_expires_at = NULL
        WHERE id = $1
          AND leased_by = $2
          AND lease_epoch = $3
          AND status = 'processing'
        "#,
    )
    .bind(task_id)
    .bind(worker_id)
    .bind(lease_epoch)
    .bind(&result)
    .execute(&mut *tx)
    .await
    .map_err(db)?;

    if updated.rows_affected() == 0 {
        tx.rollback().await.map_err(db)?;
        return Ok(SettleOutcome::Stale);
    }

    record_event(
        &mut tx,
        task_id,
        EventKind::Completed,
        Some(worker_id),
        Some(lease_epoch),
        None,
    )
    .await?;

    tx.commit().await.map_err(db)?;
    Ok(SettleOutcome::Ok)
}

#[allow(clippy::too_many_arguments)]
pub async fn fail(
    pool: &PgPool,
    task_id: TaskId,
    worker_id: &str,
    lease_epoch: i64,
    error: &str,
    classification: FailureClassification,
    now: DateTime<Utc>,
    backoff_base_seconds: u64,
    backoff_cap_seconds: u64,
    backoff_jitter_fraction: f64,
) -> taskgraph_core::Result<FailOutcome> {
    let mut tx = pool.begin().await.map_err(db)?;

    let current = sqlx::query_as::<_, (i32, i32)>(
        r#"
        SELECT retries, max_retries
        FROM tasks
        WHERE id = $1 AND leased_by = $2 AND lease_epoch = $3 AND status = 'processing'
        FOR UPDATE
        "#,
    )
    .bind(task_id)
    .bind(worker_id)
    .bind(lease_epoch)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db)?;

    let Some((retries, max_retries)) = current else {
        tx.rollback().await.map_err(db)?;
        return Ok(FailOutcome::Stale);
    };

    let next_retries = retries + 1;
    let goes_terminal =
        classification == FailureClassification::Permanent || next_retries > max_retries;

    if goes_terminal {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                finished_at = $4,
                error = $5,
                leased_by = NULL,
                lease_expires_at = NULL,
                retries = LEAST($6, max_retries)
            WHERE id = $1 AND leased_by = $2 AND lease_epoch = $3
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(lease_epoch)
        .bind(now)
        .bind(error)
        .bind(next_retries)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        record_event(
            &mut tx,
            task_id,
            EventKind::Failed,
            Some(worker_id),
            Some(lease_epoch),
            Some(error),
        )
        .await?;

        cascade_cancel_downstream(&mut tx, task_id).await?;

        tx.commit().await.map_err(db)?;
        return Ok(FailOutcome::Terminal);
    }

    // The first retry uses 2^0 = base, so `retries` (pre-increment) is the
    // exponent, not `next_retries` — matches S2's observed 1s/2s delays.
    let delay = taskgraph_core::compute_backoff_with_system_jitter(
        retries,
        backoff_base_seconds,
        backoff_cap_seconds,
        backoff_jitter_fraction,
    );
    let next_earliest_start = now + delay;

    sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'queued',
            retries = $4,
            next_earliest_start = $5,
            leased_by = NULL,
            lease_expires_at = NULL,
            error = $6
        WHERE id = $1 AND leased_by = $2 AND lease_epoch = $3
        "#,
    )
    .bind(task_id)
    .bind(worker_id)
    .bind(lease_epoch)
    .bind(next_retries)
    .bind(next_earliest_start)
    .bind(error)
    .execute(&mut *tx)
    .await
    .map_err(db)?;

    record_event(
        &mut tx,
        task_id,
        EventKind::RetryScheduled,
        Some(worker_id),
        Some(lease_epoch),
        Some(error),
    )
    .await?;

    tx.commit().await.map_err(db)?;
    Ok(FailOutcome::Retried)
}

/// User-initiated cancel. Idempotent: cancelling an already
/// terminal task is a no-op, not an error.
pub async fn cancel(pool: &PgPool, task_id: TaskId) -> taskgraph_core::Result<()> {
    let mut tx = pool.begin().await.map_err(db)?;

    let updated = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'cancelled',
            finished_at = NOW(),
            leased_by = NULL,
            lease_expires_at = NULL
        WHERE id = $1
          AND status NOT IN ('completed', 'failed', 'cancelled')
        "#,
    )
    .bind(task_id)
    .execute(&mut *tx)
    .await
    .map_err(db)?;

    if updated.rows_affected() > 0 {
        record_event(&mut tx, task_id, EventKind::Cancelled, None, None, None).await?;
        cascade_cancel_downstream(&mut tx, task_id).await?;
    }

    tx.commit().await.map_err(db)?;
    Ok(())
}

/// Returns every task currently leased by `worker_id`, for graceful
/// shutdown. Read-only; does not touch leases —
/// the worker continues running them to completion or shutdown timeout.
pub async fn drain(pool: &PgPool, worker_id: &str) -> taskgraph_core::Result<Vec<TaskId>> {
    let ids: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM tasks WHERE leased_by = $1 AND status = 'processing'",
    )
    .bind(worker_id)
    .fetch_all(pool)
    .await
    .map_err(db)?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}
