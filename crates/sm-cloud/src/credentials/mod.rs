//! Refreshable short-lived credentials

mod provider;
mod sources;

pub use provider::{CredentialProvider, CredentialSettings, SdkCredentials};
pub use sources::{AssumeRoleSource, ProfileSource};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use sm_core::Credential;

/// Where fresh credentials come from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Produce a credential valid for `ttl` from now
    async fn fetch(&self, ttl: Duration) -> Result<Credential, CredentialError>;
}

/// Credential refresh failures
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The local profile could not produce credentials
    #[error("Failed to resolve profile credentials: {0}")]
    Resolve(String),

    /// Role assumption was rejected or failed
    #[error("Failed to assume role: {0}")]
    AssumeRole(String),

    /// The source returned a credential that is already expired
    #[error("Credential source '{0}' returned an expired credential")]
    Expired(&'static str),
}
