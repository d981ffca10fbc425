//! Tunnel supervisor configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the tunnel supervisor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Explicit path to the companion plugin; looked up on PATH when unset
    pub plugin_path: Option<PathBuf>,

    /// What to do when the companion exits without being asked to
    pub restart: RestartPolicy,
}

/// Restart behaviour after an unexpected companion exit.
///
/// The default restarts forever with no delay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Give up after this many unexpected exits (`None` = never)
    pub max_restarts: Option<u32>,

    /// Delay between restarts (`None` = restart immediately)
    pub backoff: Option<BackoffConfig>,
}

impl RestartPolicy {
    /// Whether another restart is allowed after `restarts` so far
    pub fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
