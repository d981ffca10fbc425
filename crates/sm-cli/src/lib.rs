//! summoner: Command-line front end
//!
//! Wires the credential provider, AWS adapter, state controller and tunnel
//! supervisor together behind the `summoner` binary, and provides the thin
//! edges around them: client launchers, the interactive state prompt and
//! terminal output.

pub mod actions;
pub mod commands;
pub mod output;
pub mod policy;
