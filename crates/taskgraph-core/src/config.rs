//! Runtime configuration, loaded from environment variables.

use std::env;
use std::time::Duration;

/// Every tunable the scheduler needs at runtime, each carrying the default
/// used in production.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_death_multiplier: u64,
    pub default_lease_duration_seconds: u64,
    pub max_retries_default: i32,
    pub retry_backoff_base_seconds: u64,
    pub retry_backoff_cap_seconds: u64,
    pub retry_backoff_jitter_fraction: f64,
    pub recovery_interval_seconds: u64,
    pub worker_max_concurrent: i32,
    pub dispatch_idle_sleep_ms_min: u64,
    pub dispatch_idle_sleep_ms_max: u64,
    pub payload_max_bytes: usize,
    pub database_url: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 30,
            heartbeat_death_multiplier: 3,
            default_lease_duration_seconds: 1800,
            max_retries_default: 3,
            retry_backoff_base_seconds: 300,
            retry_backoff_cap_seconds: 3600,
            retry_backoff_jitter_fraction: 0.2,
            recovery_interval_seconds: 60,
            worker_max_concurrent: 3,
            dispatch_idle_sleep_ms_min: 1000,
            dispatch_idle_sleep_ms_max: 5000,
            payload_max_bytes: 1024 * 1024,
            database_url: String::new(),
        }
    }
}

impl SchedulerConfig {
    /// Loads overrides from environment variables on top of the documented
    /// defaults. Unset or unparsable variables fall back silently to the
    /// default — this is a tunable, not a required input, except for
    /// `database_url` which callers must supply themselves if the
    /// environment doesn't provide one.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        fn env_u64(key: &str, default: u64) -> u64 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn env_i32(key: &str, default: i32) -> i32 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn env_f64(key: &str, default: f64) -> f64 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        cfg.heartbeat_interval_seconds =
            env_u64("HEARTBEAT_INTERVAL_SECONDS", cfg.heartbeat_interval_seconds);
        cfg.heartbeat_death_multiplier = env_u64(
            "HEARTBEAT_DEATH_MULTIPLIER",
            cfg.heartbeat_death_multiplier,
        );
        cfg.default_lease_duration_seconds = env_u64(
            "DEFAULT_LEASE_DURATION_SECONDS",
            cfg.default_lease_duration_seconds,
        );
        cfg.max_retries_default = env_i32("MAX_RETRIES_DEFAULT", cfg.max_retries_default);
        cfg.retry_backoff_base_seconds = env_u64(
            "RETRY_BACKOFF_BASE_SECONDS",
            cfg.retry_backoff_base_seconds,
        );
        cfg.retry_backoff_cap_seconds =
            env_u64("RETRY_BACKOFF_CAP_SECONDS", cfg.retry_backoff_cap_seconds);
        cfg.retry_backoff_jitter_fraction = env_f64(
            "RETRY_BACKOFF_JITTER_FRACTION",
            cfg.retry_backoff_jitter_fraction,
        );
        cfg.recovery_interval_seconds =
            env_u64("RECOVERY_INTERVAL_SECONDS", cfg.recovery_interval_seconds);
        cfg.worker_max_concurrent = env_i32("WORKER_MAX_CONCURRENT", cfg.worker_max_concurrent);
        cfg.dispatch_idle_sleep_ms_min = env_u64(
            "DISPATCH_IDLE_SLEEP_MS_MIN",
            cfg.dispatch_idle_sleep_ms_min,
        );
        cfg.dispatch_idle_sleep_ms_max = env_u64(
            "DISPATCH_IDLE_SLEEP_MS_MAX",
            cfg.dispatch_idle_sleep_ms_max,
        );
        cfg.payload_max_bytes =
            env_u64("PAYLOAD_MAX_BYTES", cfg.payload_max_bytes as u64) as usize;
        cfg.database_url = env::var("DATABASE_URL").unwrap_or_default();

        cfg
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Threshold past which a non-heartbeating worker is declared dead.
    pub fn death_threshold(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds * self.heartbeat_death_multiplier)
    }

    pub fn default_lease_duration(&self) -> Duration {
        Duration::from_secs(self.default_lease_duration_seconds)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_seconds)
    }
}
