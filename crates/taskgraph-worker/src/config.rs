//! One worker process's identity and tuning. Distinct from
//! `taskgraph_core::SchedulerConfig`, which holds deployment-wide defaults —
//! a `WorkerConfig` is built from it plus the things only a single process
//! knows: its own id and which task kinds it can run.

use std::time::Duration;

use taskgraph_core::{SchedulerConfig, TaskKind};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub capabilities: Vec<TaskKind>,
    pub max_concurrent: usize,
    pub lease_duration: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_death_threshold: Duration,
    pub dispatch_idle_sleep_min: Duration,
    pub dispatch_idle_sleep_max: Duration,
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_scheduler_config(
        worker_id: impl Into<String>,
        capabilities: Vec<TaskKind>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            capabilities,
            max_concurrent: config.worker_max_concurrent.max(1) as usize,
            lease_duration: config.default_lease_duration(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_death_threshold: config.death_threshold(),
            dispatch_idle_sleep_min: Duration::from_millis(config.dispatch_idle_sleep_ms_min),
            dispatch_idle_sleep_max: Duration::from_millis(config.dispatch_idle_sleep_ms_max),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// The lease-extension coroutine must renew strictly before the lease
    /// expires; half the lease duration is a conservative ceiling.
    pub fn lease_extension_interval(&self) -> Duration {
        self.lease_duration / 2
    }
}
