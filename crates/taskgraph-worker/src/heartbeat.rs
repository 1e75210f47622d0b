//! The heartbeat loop. Runs alongside the dispatch
//! loop for the life of the process; if heartbeats fail for longer than the
//! death threshold, the worker must stop accepting new tasks and exit,
//! since continuing with a stale registration risks duplicate execution.

use std::sync::Arc;
use std::time::Duration;

use taskgraph_core::QueueStore;
use tokio::time::Instant;
use tracing::{error, warn};

/// Runs until `shutdown` resolves or the death threshold is exceeded, in
/// which case it returns `Err` so the caller can tear the worker down.
pub async fn run(
    store: Arc<dyn QueueStore>,
    worker_id: String,
    interval: Duration,
    death_threshold: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut last_success = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.heartbeat(&worker_id).await {
                    Ok(()) => {
                        last_success = Instant::now();
                    }
                    Err(err) => {
                        warn!(worker_id = %worker_id, error = %err, "heartbeat update failed");
                        if last_success.elapsed() > death_threshold {
                            error!(
                                worker_id = %worker_id,
                                "heartbeat has been failing past the death threshold, exiting"
                            );
                            anyhow::bail!("heartbeat death threshold exceeded for {worker_id}");
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}
