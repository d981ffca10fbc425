//! Remote service boundary

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::{BrokerSession, InstanceState, Target};

/// Document used for every broker session
pub const PORT_FORWARDING_DOCUMENT: &str = "AWS-StartPortForwardingSession";

/// Reason string attached to broker sessions
pub const SESSION_REASON: &str = "Summoner Session";

/// The compute and session-broker operations Summoner needs.
///
/// Implementations must resolve credentials immediately before each call and
/// translate every failure into a [`RemoteError`], classified where possible.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Current power state. A missing status record means stopped.
    async fn describe_instance_status(&self, target: &Target)
        -> Result<InstanceState, RemoteError>;

    /// Request the instance to start
    async fn start_instance(&self, target: &Target) -> Result<(), RemoteError>;

    /// Request the instance to stop
    async fn stop_instance(&self, target: &Target) -> Result<(), RemoteError>;

    /// Active broker sessions addressed to the target
    async fn describe_active_sessions(
        &self,
        target: &Target,
    ) -> Result<Vec<BrokerSession>, RemoteError>;

    /// Open a port-forwarding session `remote_port -> local_port`.
    ///
    /// `Ok(None)` means the broker refused to create one.
    async fn start_session(&self, target: &Target) -> Result<Option<BrokerSession>, RemoteError>;

    /// Terminate a broker session
    async fn terminate_session(
        &self,
        target: &Target,
        session: &BrokerSession,
    ) -> Result<(), RemoteError>;
}
