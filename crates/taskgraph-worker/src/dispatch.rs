//! The dispatch loop and handler execution.
//!
//! Concurrency is bounded by a `Semaphore` sized to `max_concurrent`
//! (grounded on the same owned-permit pattern task executors in this
//! space use for bounding parallel work). Each claimed task gets its own
//! lease-extension coroutine, aborted as soon as the handler returns, and
//! its own `CancelSignal` so a `stale` extension result can tell the
//! handler to give up without touching any other in-flight task.

use std::sync::Arc;

use chrono::Utc;
use taskgraph_core::{
    CancelHandle, ClaimOutcome, FailureClassification, HandlerError, QueueStore, SettleOutcome,
};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::registry::HandlerRegistry;

pub async fn run(
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    config: Arc<WorkerConfig>,
    mut draining: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
    let capabilities = registry.capabilities();

    loop {
        if *draining.borrow() {
            break;
        }

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                idle_sleep(&config, &mut draining).await;
                continue;
            }
        };

        let claim = store
            .claim_next(
                &config.worker_id,
                &capabilities,
                chrono::Duration::from_std(config.lease_duration).unwrap_or_default(),
            )
            .await;

        let claimed = match claim {
            Ok(ClaimOutcome::Claimed(task)) => task,
            Ok(ClaimOutcome::None) => {
                drop(permit);
                idle_sleep(&config, &mut draining).await;
                continue;
            }
            Err(err) => {
                warn!(worker_id = %config.worker_id, error = %err, "claim_next failed");
                drop(permit);
                idle_sleep(&config, &mut draining).await;
                continue;
            }
        };

        let store = store.clone();
        let registry = registry.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let _permit = permit;
            execute_claimed_task(store, registry, config, claimed).await;
        });
    }
}

async fn idle_sleep(config: &WorkerConfig, draining: &mut watch::Receiver<bool>) {
    let span = config.dispatch_idle_sleep_max.as_millis() as u64
        - config.dispatch_idle_sleep_min.as_millis() as u64;
    let jitter_ms = if span > 0 {
        fastrand::u64(0..=span)
    } else {
        0
    };
    let sleep_for = config.dispatch_idle_sleep_min + std::time::Duration::from_millis(jitter_ms);

    tokio::select! {
        _ = tokio::time::sleep(sleep_for) => {}
        _ = draining.changed() => {}
    }
}

#[instrument(skip(store, registry, config, claimed), fields(task_id = claimed.id, kind = %claimed.kind))]
async fn execute_claimed_task(
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    config: Arc<WorkerConfig>,
    claimed: taskgraph_core::ClaimedTask,
) {
    let Some(handler) = registry.get(&claimed.kind) else {
        warn!(kind = %claimed.kind, "claimed a task kind with no registered handler, failing it");
        let _ = store
            .fail(
                claimed.id,
                &config.worker_id,
                claimed.lease_epoch,
                &format!("no handler registered for kind {}", claimed.kind),
                FailureClassification::Permanent,
                Utc::now(),
            )
            .await;
        return;
    };

    let (cancel_handle, cancel_signal) = CancelHandle::new();
    let epoch = claimed.lease_epoch;

    let extension = tokio::spawn(run_lease_extension(
        store.clone(),
        config.clone(),
        claimed.id,
        epoch,
        cancel_handle,
    ));

    let result = handler.execute(claimed.payload.clone(), cancel_signal).await;
    extension.abort();

    match result {
        Ok(value) => match store.complete(claimed.id, &config.worker_id, epoch, value).await {
            Ok(SettleOutcome::Ok) => {
                debug!(task_id = claimed.id, "task completed");
            }
            Ok(SettleOutcome::Stale) => {
                info!(task_id = claimed.id, "complete discarded: lease was reclaimed");
            }
            Err(err) => {
                warn!(task_id = claimed.id, error = %err, "complete call failed");
            }
        },
        Err(HandlerError {
            message,
            classification,
        }) => match store
            .fail(
                claimed.id,
                &config.worker_id,
                epoch,
                &message,
                classification,
                Utc::now(),
            )
            .await
        {
            Ok(outcome) => {
                debug!(task_id = claimed.id, ?outcome, "task failed");
            }
            Err(err) => {
                warn!(task_id = claimed.id, error = %err, "fail call failed");
            }
        },
    }
}

/// Periodically renews the lease and updates its epoch so the settle call
/// above uses a current value. If `extend_lease` reports `stale`, signals
/// the handler to cancel and stops renewing — a second worker already owns
/// this task.
async fn run_lease_extension(
    store: Arc<dyn QueueStore>,
    config: Arc<WorkerConfig>,
    task_id: taskgraph_core::TaskId,
    epoch: i64,
    cancel_handle: CancelHandle,
) {
    let mut ticker = tokio::time::interval(config.lease_extension_interval());
    ticker.tick().await; // first tick fires immediately; the lease was just granted

    loop {
        ticker.tick().await;
        let new_duration = chrono::Duration::from_std(config.lease_duration).unwrap_or_default();

        match store
            .extend_lease(task_id, &config.worker_id, epoch, new_duration, None, None)
            .await
        {
            Ok(SettleOutcome::Ok) => {}
            Ok(SettleOutcome::Stale) => {
                warn!(task_id, "lease extension found task stale, cancelling handler");
                cancel_handle.cancel();
                return;
            }
            Err(err) => {
                warn!(task_id, error = %err, "lease extension failed, will retry next interval");
            }
        }
    }
}
