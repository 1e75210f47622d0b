//! Recovery Service — an independent periodic job. Every
//! cycle runs three reclaim passes in a single transaction; every pass is
//! safe to run concurrently with workers and with other Recovery Service
//! replicas, since `FOR UPDATE SKIP LOCKED` semantics in the other passes
//! guarantee forward progress (a second replica simply finds fewer rows).

use sqlx::PgPool;
use taskgraph_core::RecoveryReport;
use tracing::info;

use crate::error::db;
use crate::events::{record_event, EventKind};

pub async fn run_recovery_cycle(
    pool: &PgPool,
    death_threshold_seconds: i64,
) -> taskgraph_core::Result<RecoveryReport> {
    let mut tx = pool.begin().await.map_err(db)?;

    // Pass 1: expired leases. Retry counter is untouched — a lost worker
    // is not a handler failure.
    let reclaimed: Vec<(i64,)> = sqlx::query_as(
        r#"
        UPDATE tasks
        SET status = 'queued',
            leased_by = NULL,
            lease_expires_at = NULL,
            next_earliest_start = NOW() + INTERVAL '1 second'
        WHERE status = 'processing' AND lease_expires_at < NOW()
        RETURNING id
        "#,
    )
    .fetch_all(&mut *tx)
    .await
    .map_err(db)?;

    for (task_id,) in &reclaimed {
        record_event(
            &mut tx,
            *task_id,
            EventKind::LeaseReclaimed,
            None,
            None,
            None,
        )
        .await?;
    }

    // Pass 2: dead workers. Any still-active leases they hold are swept up
    // by pass 1 on this cycle or the next.
    let dead_workers: Vec<(String,)> = sqlx::query_as(
        r#"
        UPDATE workers
        SET status = 'dead'
        WHERE status = 'active'
          AND last_heartbeat_at < NOW() - make_interval(secs => $1)
        RETURNING id
        "#,
    )
    .bind(death_threshold_seconds as f64)
    .fetch_all(&mut *tx)
    .await
    .map_err(db)?;

    // Pass 3: stale retries. Purely advisory — nudges tasks one step away
    // from exhausting their retries forward so they aren't stuck behind a
    // clock skew or a next_earliest_start set far in the past.
    sqlx::query(
        r#"
        UPDATE tasks
        SET next_earliest_start = NOW()
        WHERE status = 'queued'
          AND retries = max_retries - 1
          AND next_earliest_start < NOW() - INTERVAL '1 hour'
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(db)?;

    tx.commit().await.map_err(db)?;

    let report = RecoveryReport {
        leases_reclaimed: reclaimed.len() as u64,
        workers_marked_dead: dead_workers.len() as u64,
    };

    if report.leases_reclaimed > 0 || report.workers_marked_dead > 0 {
        info!(
            leases_reclaimed = report.leases_reclaimed,
            workers_marked_dead = report.workers_marked_dead,
            "recovery cycle reclaimed state"
        );
    }

    Ok(report)
}
