//! AWS implementation of the remote service boundary
//!
//! Every call site maps SDK failures through [`classify_sdk_error`], which
//! classifies the full error context (service code included) into a
//! [`RemoteError`]. Clients are created lazily per region and always sign with
//! the shared [`CredentialProvider`].

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::{SessionFilter, SessionFilterKey, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use sm_core::traits::cloud::{PORT_FORWARDING_DOCUMENT, SESSION_REASON};
use sm_core::{BrokerSession, CloudApi, InstanceState, RemoteError, Target};

use crate::credentials::{CredentialProvider, SdkCredentials};

/// EC2 and SSM clients for one region
#[derive(Debug, Clone)]
struct RegionClients {
    ec2: aws_sdk_ec2::Client,
    ssm: aws_sdk_ssm::Client,
}

/// [`CloudApi`] backed by the AWS SDK
#[derive(Debug)]
pub struct AwsCloud {
    credentials: Arc<CredentialProvider>,
    clients: Mutex<HashMap<String, RegionClients>>,
}

impl AwsCloud {
    pub fn new(credentials: Arc<CredentialProvider>) -> Self {
        Self {
            credentials,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The provider used to sign requests
    pub fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    async fn clients(&self, region: &str) -> RegionClients {
        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(region) {
            return existing.clone();
        }

        tracing::debug!("Creating EC2/SSM clients for {}", region);
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(SdkCredentials(Arc::clone(&self.credentials)))
            .load()
            .await;

        let created = RegionClients {
            ec2: aws_sdk_ec2::Client::new(&config),
            ssm: aws_sdk_ssm::Client::new(&config),
        };
        clients.insert(region.to_string(), created.clone());
        created
    }
}

/// Translate an SDK failure into a classified [`RemoteError`]
fn classify_sdk_error<E>(operation: &'static str, err: E) -> RemoteError
where
    E: std::error::Error,
{
    let message = DisplayErrorContext(&err).to_string();
    RemoteError::from_message(operation, message.clone(), message)
}

#[async_trait]
impl CloudApi for AwsCloud {
    async fn describe_instance_status(
        &self,
        target: &Target,
    ) -> Result<InstanceState, RemoteError> {
        let clients = self.clients(target.region()).await;
        let output = clients
            .ec2
            .describe_instance_status()
            .instance_ids(target.instance_id().as_str())
            .send()
            .await
            .map_err(|e| classify_sdk_error("describe_instance_status", e))?;

        // Stopped instances have no status record unless all instances are
        // requested, so absence means stopped.
        let state = output
            .instance_statuses()
            .first()
            .and_then(|status| status.instance_state())
            .and_then(|state| state.name())
            .map(|name| InstanceState::from_remote(name.as_str()))
            .unwrap_or(InstanceState::Stopped);

        Ok(state)
    }

    async fn start_instance(&self, target: &Target) -> Result<(), RemoteError> {
        tracing::info!("Starting instance {}...", target.name());
        let clients = self.clients(target.region()).await;
        clients
            .ec2
            .start_instances()
            .instance_ids(target.instance_id().as_str())
            .send()
            .await
            .map_err(|e| classify_sdk_error("start_instance", e))?;
        Ok(())
    }

    async fn stop_instance(&self, target: &Target) -> Result<(), RemoteError> {
        tracing::info!("Stopping instance {}...", target.name());
        let clients = self.clients(target.region()).await;
        clients
            .ec2
            .stop_instances()
            .instance_ids(target.instance_id().as_str())
            .send()
            .await
            .map_err(|e| classify_sdk_error("stop_instance", e))?;
        Ok(())
    }

    async fn describe_active_sessions(
        &self,
        target: &Target,
    ) -> Result<Vec<BrokerSession>, RemoteError> {
        let clients = self.clients(target.region()).await;
        let filter = SessionFilter::builder()
            .key(SessionFilterKey::TargetId)
            .value(target.instance_id().as_str())
            .build()
            .map_err(|e| classify_sdk_error("describe_active_sessions", e))?;

        let output = clients
            .ssm
            .describe_sessions()
            .state(SessionState::Active)
            .filters(filter)
            .send()
            .await
            .map_err(|e| classify_sdk_error("describe_active_sessions", e))?;

        Ok(output
            .sessions()
            .iter()
            .filter_map(|session| session.session_id())
            .map(BrokerSession::from_id)
            .collect())
    }

    async fn start_session(&self, target: &Target) -> Result<Option<BrokerSession>, RemoteError> {
        let clients = self.clients(target.region()).await;
        let output = clients
            .ssm
            .start_session()
            .target(target.instance_id().as_str())
            .document_name(PORT_FORWARDING_DOCUMENT)
            .reason(SESSION_REASON)
            .parameters("portNumber", vec![target.remote_port().to_string()])
            .parameters("localPortNumber", vec![target.local_port().to_string()])
            .send()
            .await
            .map_err(|e| classify_sdk_error("start_session", e))?;

        Ok(output.session_id().map(|id| BrokerSession {
            session_id: id.to_string(),
            token_value: output.token_value().map(str::to_string),
            stream_url: output.stream_url().map(str::to_string),
        }))
    }

    async fn terminate_session(
        &self,
        target: &Target,
        session: &BrokerSession,
    ) -> Result<(), RemoteError> {
        let clients = self.clients(target.region()).await;
        clients
            .ssm
            .terminate_session()
            .session_id(&session.session_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error("terminate_session", e))?;
        tracing::debug!("Terminated broker session {}", session.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::ApiErrorKind;

    #[derive(Debug)]
    struct FakeSdkError(&'static str);

    impl std::fmt::Display for FakeSdkError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for FakeSdkError {}

    #[test]
    fn test_remote_error_classifies_context() {
        let err = classify_sdk_error(
            "start_instance",
            FakeSdkError("IncorrectInstanceState: instance is stopping"),
        );
        assert_eq!(err.kind(), Some(ApiErrorKind::InvalidState));
    }

    #[test]
    fn test_remote_error_keeps_unclassified_cause() {
        let err = classify_sdk_error("start_session", FakeSdkError("RequestLimitExceeded"));
        match err {
            RemoteError::Unclassified(inner) => {
                assert_eq!(inner.operation, "start_session");
                assert!(inner.source.to_string().contains("RequestLimitExceeded"));
            }
            other => panic!("expected unclassified, got {:?}", other),
        }
    }
}
