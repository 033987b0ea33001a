//! Configuration for the outbox projector.

use std::time::Duration;

/// Tuning knobs for one projector instance.
///
/// The defaults suit a single-node deployment; the daemon overrides them
/// from its config file.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Maximum rows claimed per cycle.
    pub batch_size: usize,

    /// Publish attempts before a row is dead-lettered.
    pub max_retry_attempts: i32,

    /// Sleep after a cycle that handled work.
    pub sleep_busy: Duration,

    /// Base sleep after an empty poll; doubles per consecutive empty poll.
    pub sleep_idle: Duration,

    /// Ceiling for the idle sleep.
    pub sleep_idle_max: Duration,

    /// How long a claim holds rows before a crashed instance's batch
    /// returns to the pool.
    pub claim_ttl: Duration,

    /// Pause after an infrastructure error before the loop resumes.
    pub cooldown: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            max_retry_attempts: 5,
            sleep_busy: Duration::from_millis(100),
            sleep_idle: Duration::from_secs(1),
            sleep_idle_max: Duration::from_secs(5),
            claim_ttl: Duration::from_secs(30),
            cooldown: Duration::from_secs(1),
        }
    }
}
