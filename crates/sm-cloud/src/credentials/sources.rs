//! Credential sources backed by the AWS SDK

use async_trait::async_trait;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_sts::error::DisplayErrorContext;
use std::time::Duration;

use sm_core::time::expiry_after;
use sm_core::Credential;

use super::{CredentialError, CredentialSource};

/// The profile's own long-lived credentials with a synthetic expiry.
///
/// The underlying keys do not rotate; wrapping them with `now + ttl` lets the
/// provider treat both sources the same way.
#[derive(Debug)]
pub struct ProfileSource {
    inner: ProfileFileCredentialsProvider,
}

impl ProfileSource {
    pub fn new(profile: &str) -> Self {
        Self {
            inner: ProfileFileCredentialsProvider::builder()
                .profile_name(profile)
                .build(),
        }
    }
}

#[async_trait]
impl CredentialSource for ProfileSource {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn fetch(&self, ttl: Duration) -> Result<Credential, CredentialError> {
        let creds = self
            .inner
            .provide_credentials()
            .await
            .map_err(|e| CredentialError::Resolve(DisplayErrorContext(&e).to_string()))?;

        Ok(Credential {
            access_key: creds.access_key_id().to_string(),
            secret_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
            expiry: expiry_after(ttl),
        })
    }
}

/// Temporary credentials from an STS role assumption
#[derive(Debug)]
pub struct AssumeRoleSource {
    client: aws_sdk_sts::Client,
    role_arn: String,
    session_name: String,
}

impl AssumeRoleSource {
    /// Build an STS client that signs with `profile` in `region`
    pub async fn new(profile: &str, region: &str, role_arn: &str, session_name: &str) -> Self {
        let base = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: aws_sdk_sts::Client::new(&base),
            role_arn: role_arn.to_string(),
            session_name: session_name.to_string(),
        }
    }
}

#[async_trait]
impl CredentialSource for AssumeRoleSource {
    fn name(&self) -> &'static str {
        "sts-assume-role"
    }

    async fn fetch(&self, ttl: Duration) -> Result<Credential, CredentialError> {
        tracing::debug!(
            "Assuming role {} as '{}' for {}s",
            self.role_arn,
            self.session_name,
            ttl.as_secs()
        );

        let output = self
            .client
            .assume_role()
            .role_arn(&self.role_arn)
            .role_session_name(&self.session_name)
            .duration_seconds(i32::try_from(ttl.as_secs()).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| CredentialError::AssumeRole(DisplayErrorContext(&e).to_string()))?;

        let creds = output.credentials().ok_or_else(|| {
            CredentialError::AssumeRole("response did not include credentials".to_string())
        })?;

        Ok(Credential {
            access_key: creds.access_key_id().to_string(),
            secret_key: creds.secret_access_key().to_string(),
            session_token: Some(creds.session_token().to_string()),
            expiry: expiry_after(ttl),
        })
    }
}
