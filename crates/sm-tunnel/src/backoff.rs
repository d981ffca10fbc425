//! Delays between plugin restarts

use std::time::Duration;

use sm_core::config::BackoffConfig;

/// Restart delay schedule for one supervisor run.
///
/// The n-th consecutive failed cycle waits `initial * multiplier^n`, capped at
/// `max`, plus up to `jitter` of that again. A cycle that reached readiness
/// starts the schedule over.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl RestartBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for a given attempt, before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.config.initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.config.max.as_secs_f64() {
            return self.config.max;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay before the next restart
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        base.mul_f64(1.0 + jitter * rand::random::<f64>())
    }

    /// Called after a cycle that reached readiness
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
