//! sm-tunnel: Companion process supervision for Summoner
//!
//! A [`TunnelSupervisor`] owns one connection attempt's broker sessions and
//! the `session-manager-plugin` process forwarding `localhost:<local_port>`
//! to the instance. It restarts the plugin when it dies and cleans up every
//! session it has seen when stopped.

pub mod backoff;
pub mod plugin;
pub mod supervisor;

pub use backoff::RestartBackoff;
pub use supervisor::{TrackedSession, TunnelSettings, TunnelSupervisor};
