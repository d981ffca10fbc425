//! Instance profile configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ConnectionTypes, Target};

use super::validate;

/// A known instance in an account file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceProfile {
    /// Display name, also used to select the instance on the command line
    pub name: String,

    /// Cloud instance id
    pub instance_id: String,

    /// Region override (defaults to the account region)
    #[serde(default)]
    pub region: Option<String>,

    /// Connection type (`rdp`, `ssh`, `vnc` or a custom type)
    pub connection_type: String,

    /// Logon domain
    #[serde(default)]
    pub domain: Option<String>,

    /// Logon username
    #[serde(default)]
    pub username: Option<String>,

    /// Fixed local port (random when unset)
    #[serde(default)]
    pub local_port: Option<u16>,
}

impl InstanceProfile {
    /// Build a connection target from this profile
    pub fn to_target(
        &self,
        default_region: &str,
        types: &ConnectionTypes,
    ) -> Result<Target, ConfigError> {
        let region = self.region.as_deref().unwrap_or(default_region);
        let target = Target::new(
            self.name.clone(),
            self.instance_id.as_str(),
            region,
            &self.connection_type,
            types,
        )?
        .with_domain(self.domain.clone())
        .with_username(self.username.clone());

        Ok(match self.local_port {
            Some(port) => target.with_local_port(port),
            None => target,
        })
    }

    /// Validate ids, region and port
    pub fn validate(&self, types: &ConnectionTypes) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingField("name".to_string()));
        }
        validate::instance_id(&self.instance_id)?;
        if let Some(region) = &self.region {
            validate::region(region)?;
        }
        if let Some(port) = self.local_port {
            validate::local_port(port)?;
        }
        if !types.contains(&self.connection_type) {
            return Err(ConfigError::UnknownConnectionType(
                self.connection_type.clone(),
            ));
        }
        Ok(())
    }
}
