//! Caching credential provider
//!
//! Holds the current credential and swaps it for a fresh one whenever it is
//! expired or about to expire. Callers never ask for a refresh explicitly.

use aws_credential_types::provider::{self, error::CredentialsError, ProvideCredentials};
use aws_credential_types::Credentials;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

use sm_core::config::{validate, AccountConfig, TimingConfig};
use sm_core::{ConfigError, Credential};

use super::{AssumeRoleSource, CredentialError, CredentialSource, ProfileSource};

/// Session name used for role assumption when none is configured
pub const DEFAULT_SESSION_NAME: &str = "Summoner";

/// Inputs to [`CredentialProvider::initialize`]
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub region: String,
    pub profile: String,
    pub role_arn: Option<String>,
    pub session_name: String,
    pub ttl: Duration,
    pub refresh_margin: Duration,
}

impl CredentialSettings {
    pub fn new(region: impl Into<String>, profile: impl Into<String>) -> Self {
        let account = AccountConfig::default();
        Self {
            region: region.into(),
            profile: profile.into(),
            role_arn: None,
            session_name: DEFAULT_SESSION_NAME.to_string(),
            ttl: account.session_ttl,
            refresh_margin: TimingConfig::default().refresh_margin,
        }
    }

    pub fn with_role(mut self, role_arn: Option<String>) -> Self {
        self.role_arn = role_arn;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Settings taken from an account file
    pub fn from_account(account: &AccountConfig) -> Self {
        Self {
            region: account.region.clone(),
            profile: account.profile.clone(),
            role_arn: account.role_arn.clone(),
            session_name: account
                .session_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            ttl: account.session_ttl,
            refresh_margin: account.timing.refresh_margin,
        }
    }
}

/// Obtains and transparently refreshes short-lived credentials
pub struct CredentialProvider {
    settings: CredentialSettings,
    source: Arc<dyn CredentialSource>,
    current: Mutex<Credential>,
}

impl CredentialProvider {
    /// Create a provider backed by the local profile, assuming `role_arn`
    /// on top of it when one is set.
    ///
    /// Fails with [`ConfigError::ProfileNotFound`] if the first credential
    /// cannot be obtained, and with [`ConfigError::Invalid`] for a ttl the
    /// credential source would refuse.
    pub async fn initialize(settings: CredentialSettings) -> Result<Self, ConfigError> {
        validate::session_ttl(settings.ttl, settings.role_arn.is_some())?;

        let source: Arc<dyn CredentialSource> = match &settings.role_arn {
            Some(arn) => Arc::new(
                AssumeRoleSource::new(
                    &settings.profile,
                    &settings.region,
                    arn,
                    &settings.session_name,
                )
                .await,
            ),
            None => Arc::new(ProfileSource::new(&settings.profile)),
        };

        Self::with_source(settings, source).await
    }

    /// Create a provider with an explicit source
    pub async fn with_source(
        settings: CredentialSettings,
        source: Arc<dyn CredentialSource>,
    ) -> Result<Self, ConfigError> {
        let initial = fetch_valid(source.as_ref(), settings.ttl)
            .await
            .map_err(|e| ConfigError::ProfileNotFound {
                profile: settings.profile.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            "Loaded credentials for profile '{}' via {}",
            settings.profile,
            source.name()
        );

        Ok(Self {
            settings,
            source,
            current: Mutex::new(initial),
        })
    }

    /// A credential that expires strictly after now.
    ///
    /// Refreshes first if the cached one is inside the safety margin.
    /// Concurrent callers wait for a single refresh.
    pub async fn get_credentials(&self) -> Result<Credential, CredentialError> {
        let mut current = self.current.lock().await;

        if current.expires_within(SystemTime::now(), self.settings.refresh_margin) {
            tracing::debug!("Refreshing credentials via {}", self.source.name());
            *current = fetch_valid(self.source.as_ref(), self.settings.ttl).await?;
        }

        Ok(current.clone())
    }

    /// Credential profile name
    pub fn profile(&self) -> &str {
        &self.settings.profile
    }

    /// Home region
    pub fn region(&self) -> &str {
        &self.settings.region
    }

    pub fn settings(&self) -> &CredentialSettings {
        &self.settings
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("settings", &self.settings)
            .field("source", &self.source.name())
            .finish()
    }
}

async fn fetch_valid(
    source: &dyn CredentialSource,
    ttl: Duration,
) -> Result<Credential, CredentialError> {
    let credential = source.fetch(ttl).await?;
    if credential.expiry <= SystemTime::now() {
        return Err(CredentialError::Expired(source.name()));
    }
    Ok(credential)
}

/// Adapter handing a shared [`CredentialProvider`] to SDK clients
#[derive(Debug, Clone)]
pub struct SdkCredentials(pub Arc<CredentialProvider>);

impl ProvideCredentials for SdkCredentials {
    fn provide_credentials<'a>(&'a self) -> provider::future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        provider::future::ProvideCredentials::new(async move {
            let credential = self
                .0
                .get_credentials()
                .await
                .map_err(CredentialsError::provider_error)?;

            Ok(Credentials::new(
                credential.access_key,
                credential.secret_key,
                credential.session_token,
                Some(credential.expiry),
                "summoner",
            ))
        })
    }
}
