use std::env;

/// Tunables for the background execution worker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the worker polls the job queue (seconds)
    pub poll_interval_secs: u64,
    /// Maximum jobs claimed per poll
    pub batch_size: i64,
    /// Total delivery attempts before a job is dead-lettered
    pub max_attempts: i32,
    /// Delay before a failed job becomes claimable again (seconds)
    pub retry_delay_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            batch_size: 10,
            max_attempts: 3,
            retry_delay_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval_secs: env::var("WORKFLOW_POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_interval_secs),
            batch_size: env::var("WORKFLOW_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
            max_attempts: env::var("WORKFLOW_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            retry_delay_secs: env::var("WORKFLOW_RETRY_DELAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_delay_secs),
        }
    }
}
