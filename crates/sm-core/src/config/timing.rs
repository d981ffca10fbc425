//! Polling and settle delays
//!
//! The defaults come from observed guest boot times: the instance needs a
//! while after reporting `running` before its network stack accepts a tunnel.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Interval between instance status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Pause after an instance reaches `stopped`
pub const DEFAULT_STOP_SETTLE: Duration = Duration::from_secs(15);

/// Pause after an instance reaches `running` before connecting
pub const DEFAULT_BOOT_SETTLE: Duration = Duration::from_secs(60);

/// How long callers wait for the tunnel to report readiness
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Credentials closer than this to expiry are refreshed before use
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Timing knobs for the state controller, tunnel and credential provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    #[serde(with = "duration_secs")]
    pub stop_settle: Duration,

    #[serde(with = "duration_secs")]
    pub boot_settle: Duration,

    #[serde(with = "duration_secs")]
    pub ready_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub refresh_margin: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_settle: DEFAULT_STOP_SETTLE,
            boot_settle: DEFAULT_BOOT_SETTLE,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override() {
        let timing: TimingConfig = toml::from_str("boot_settle = 90").unwrap();
        assert_eq!(timing.boot_settle, Duration::from_secs(90));
        assert_eq!(timing.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_poll_interval_shorter_than_boot_settle() {
        let timing = TimingConfig::default();
        assert!(timing.poll_interval < timing.boot_settle);
    }
}
