//! Account configuration
//!
//! One account file describes the credential profile, optional role to
//! assume, and the instances reachable with it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{validate, InstanceProfile, TimingConfig, TunnelConfig};
use crate::error::ConfigError;
use crate::types::ConnectionTypes;

/// Default credential lifetime requested from the provider
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Configuration for one cloud account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Local credential profile name
    pub profile: String,

    /// Role to assume on top of the profile
    pub role_arn: Option<String>,

    /// Session name used for role assumption
    pub session_name: Option<String>,

    /// Default region for instances without an override
    pub region: String,

    /// Lifetime of each credential refresh
    #[serde(with = "duration_secs")]
    pub session_ttl: Duration,

    /// Polling and settle delays
    pub timing: TimingConfig,

    /// Tunnel supervisor settings
    pub tunnel: TunnelConfig,

    /// Extra connection types (`name = remote_port`)
    pub connection_types: BTreeMap<String, u16>,

    /// Known instances
    pub instances: Vec<InstanceProfile>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            role_arn: None,
            session_name: None,
            region: "us-west-1".to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            timing: TimingConfig::default(),
            tunnel: TunnelConfig::default(),
            connection_types: BTreeMap::new(),
            instances: Vec::new(),
        }
    }
}

impl AccountConfig {
    /// Built-in connection types extended with this account's extras
    pub fn connection_types(&self) -> ConnectionTypes {
        self.connection_types
            .iter()
            .fold(ConnectionTypes::default(), |table, (name, port)| {
                table.with_type(name.as_str(), *port)
            })
    }

    /// Find an instance by name
    pub fn instance(&self, name: &str) -> Option<&InstanceProfile> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Validate every field that has a known format
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.is_empty() {
            return Err(ConfigError::MissingField("profile".to_string()));
        }
        validate::region(&self.region)?;
        if let Some(arn) = &self.role_arn {
            validate::role_arn(arn)?;
        }
        validate::session_ttl(self.session_ttl, self.role_arn.is_some())?;

        let types = self.connection_types();
        for instance in &self.instances {
            instance.validate(&types)?;
        }
        Ok(())
    }
}
