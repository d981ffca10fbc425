//! sm-core: Core abstractions and configuration for Summoner
//!
//! This crate provides the domain types, error taxonomy, configuration
//! structures and the remote service boundary shared by the credential,
//! tunnel, orchestrator and CLI crates.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{ApiErrorKind, ConfigError, RemoteError, SummonerError, TunnelError};
pub use traits::CloudApi;
pub use types::{
    BrokerSession, ConnectionTypes, Credential, InstanceId, InstanceState, Target, TunnelState,
};
