//! sm-orchestrator: Instance state control and connection orchestration
//!
//! The [`RemoteStateController`] drives an instance's power state towards
//! what a connection attempt needs. The [`ConnectionOrchestrator`] runs one
//! attempt end to end: prepare the instance, open the tunnel, hand it to a
//! [`ConnectAction`], then tear everything down again.

pub mod controller;
pub mod orchestrator;

pub use controller::{
    AbortPolicy, Intent, RemoteStateController, RunningDecision, StateOutcome, StatePolicy,
    StoppedDecision,
};
pub use orchestrator::{ConnectAction, ConnectReport, ConnectionOrchestrator};
