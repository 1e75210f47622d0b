//! The worker process lifecycle: register, recover, then run
//! the heartbeat and dispatch loops side by side until told to shut down.

use std::sync::Arc;

use taskgraph_core::{QueueStore, WorkerStatus};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::registry::HandlerRegistry;
use crate::{dispatch, heartbeat};

pub struct WorkerRuntime {
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    config: Arc<WorkerConfig>,
}

impl WorkerRuntime {
    pub fn new(store: Arc<dyn QueueStore>, registry: HandlerRegistry, config: WorkerConfig) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    /// Runs until `shutdown` resolves, then drains gracefully: stops
    /// accepting new claims, waits for in-flight handlers up to
    /// `shutdown_timeout`, and returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let worker_id = self.config.worker_id.clone();

        self.store
            .register_worker(
                &worker_id,
                &self.registry.capabilities(),
                self.config.max_concurrent as i32,
            )
            .await?;

        // Recover: a previous incarnation of this worker_id may have left
        // leases behind after a crash. Expire them immediately rather than
        // trying to continue them.
        let reclaimed = self.store.expire_own_leases(&worker_id).await?;
        if reclaimed > 0 {
            info!(worker_id = %worker_id, reclaimed, "expired leases from a previous incarnation");
        }

        let (draining_tx, draining_rx) = watch::channel(false);

        let heartbeat_store = self.store.clone();
        let heartbeat_worker_id = worker_id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let heartbeat_death_threshold = self.config.heartbeat_death_threshold;
        let heartbeat_shutdown = shutdown.clone();
        let mut heartbeat_task = tokio::spawn(async move {
            heartbeat::run(
                heartbeat_store,
                heartbeat_worker_id,
                heartbeat_interval,
                heartbeat_death_threshold,
                heartbeat_shutdown,
            )
            .await
        });

        let dispatch_task = tokio::spawn(dispatch::run(
            self.store.clone(),
            self.registry.clone(),
            self.config.clone(),
            draining_rx,
        ));

        let outcome = tokio::select! {
            _ = shutdown.changed() => {
                info!(worker_id = %worker_id, "shutdown requested, draining");
                Ok(())
            }
            res = &mut heartbeat_task => {
                warn!(worker_id = %worker_id, "heartbeat loop exited, initiating shutdown");
                res.unwrap_or_else(|e| Err(anyhow::anyhow!(e)))
            }
        };

        self.store
            .set_worker_status(&worker_id, WorkerStatus::Draining)
            .await
            .ok();
        let _ = draining_tx.send(true);

        let _ = tokio::time::timeout(self.config.shutdown_timeout, dispatch_task).await;

        if !heartbeat_task.is_finished() {
            heartbeat_task.abort();
        }

        self.store
            .set_worker_status(&worker_id, WorkerStatus::Dead)
            .await
            .ok();

        outcome
    }
}
