//! Idle backoff between empty polls.

use std::time::Duration;

/// Exponentially growing sleep for consecutive empty polls.
///
/// Starts at the base, doubles per empty poll, saturates at the cap, and
/// snaps back to the base the moment work reappears.
#[derive(Debug)]
pub struct IdleBackoff {
    base_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl IdleBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base_ms = base.as_millis() as u64;
        let max_ms = max.as_millis() as u64;
        Self {
            base_ms,
            max_ms,
            current_ms: base_ms.min(max_ms),
        }
    }

    /// Sleep duration for this empty poll; doubles the next one.
    pub fn next_idle(&mut self) -> Duration {
        let sleep_ms = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        Duration::from_millis(sleep_ms)
    }

    /// Work appeared; the next empty poll starts from the base again.
    pub fn reset(&mut self) {
        self.current_ms = self.base_ms.min(self.max_ms);
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }
}
