//! CLI command implementations

mod account;
mod connect;
mod target;

pub use account::{config_path, config_show, init_command, list_command};
pub use connect::{build_orchestrator, connect_command, manage_command};
pub use target::{Resolved, TargetArgs};
