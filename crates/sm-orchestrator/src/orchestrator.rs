//! Connection orchestration
//!
//! One `connect` call is one attempt: the instance is brought up, a tunnel
//! supervisor is started, the connect action runs against the open tunnel,
//! and then the tunnel is torn down and the instance handed back. Teardown
//! runs whatever happened in between, including a panicking action.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use sm_core::{CloudApi, RemoteError, SummonerError, Target, TunnelError};
use sm_tunnel::{TunnelSettings, TunnelSupervisor};

use crate::controller::{Intent, RemoteStateController, StateOutcome};

/// Whatever the operator does with an open tunnel
#[async_trait]
pub trait ConnectAction: Send + Sync {
    /// Use the tunnel on `localhost:<target.local_port()>`.
    ///
    /// The supervisor is passed so an action can check liveness before
    /// retrying its own connection.
    async fn connect(&self, target: &Target, tunnel: &TunnelSupervisor) -> anyhow::Result<()>;
}

/// What happened during one connection attempt
#[derive(Debug)]
pub struct ConnectReport {
    /// Outcome of preparing the instance
    pub state: StateOutcome,
    /// Whether the tunnel reported readiness
    pub tunnel_ready: bool,
    /// Error (or panic) raised by the connect action
    pub action_error: Option<anyhow::Error>,
    /// Outcome of handing the instance back afterwards
    pub restored: Option<StateOutcome>,
}

impl ConnectReport {
    fn not_ready(state: StateOutcome) -> Self {
        Self {
            state,
            tunnel_ready: false,
            action_error: None,
            restored: None,
        }
    }
}

/// Composes the state controller and a tunnel supervisor per attempt
pub struct ConnectionOrchestrator {
    cloud: Arc<dyn CloudApi>,
    controller: RemoteStateController,
    tunnel: TunnelSettings,
}

impl ConnectionOrchestrator {
    pub fn new(
        cloud: Arc<dyn CloudApi>,
        controller: RemoteStateController,
        tunnel: TunnelSettings,
    ) -> Self {
        Self {
            cloud,
            controller,
            tunnel,
        }
    }

    pub fn controller(&self) -> &RemoteStateController {
        &self.controller
    }

    /// Run one connection attempt against `target`.
    ///
    /// Classified remote failures and action errors are reported in the
    /// returned [`ConnectReport`]. Configuration problems (such as a missing
    /// plugin) and unclassified remote failures are returned as errors, but
    /// only after the tunnel has been stopped and the instance handed back.
    pub async fn connect(
        &self,
        target: &Target,
        action: &dyn ConnectAction,
    ) -> Result<ConnectReport, SummonerError> {
        let state = self.controller.ensure(target, Intent::Connecting).await?;
        let started = match state {
            StateOutcome::Ready { started } => started,
            other => {
                tracing::warn!("{} is not available for connections", target);
                return Ok(ConnectReport::not_ready(other));
            }
        };

        let supervisor =
            TunnelSupervisor::new(Arc::clone(&self.cloud), target.clone(), self.tunnel.clone());
        let attempt = run_attempt(&supervisor, target, action).await;
        supervisor.stop().await;

        let restore = if started {
            tracing::info!("Stopping {} since it was started for this connection", target);
            Intent::Stopping
        } else {
            Intent::None
        };
        let restored = self.controller.ensure(target, restore).await;

        let (tunnel_ready, action_error) = attempt?;
        if let Some(err) = &action_error {
            tracing::error!("Connection to {} failed: {:#}", target, err);
        }

        Ok(ConnectReport {
            state,
            tunnel_ready,
            action_error,
            restored: Some(restored?),
        })
    }

    /// Hand the instance to the state policy without connecting
    pub async fn manage(&self, target: &Target) -> Result<StateOutcome, RemoteError> {
        self.controller.ensure(target, Intent::None).await
    }
}

/// Start the tunnel and run the action if it comes up
async fn run_attempt(
    supervisor: &TunnelSupervisor,
    target: &Target,
    action: &dyn ConnectAction,
) -> Result<(bool, Option<anyhow::Error>), TunnelError> {
    supervisor.start()?;

    if !supervisor.is_ready().await {
        tracing::error!("Tunnel to {} did not become ready", target);
        return Ok((false, None));
    }

    let outcome = AssertUnwindSafe(action.connect(target, supervisor))
        .catch_unwind()
        .await;

    let action_error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(panic) => Some(anyhow::anyhow!(
            "connect action panicked: {}",
            panic_message(panic.as_ref())
        )),
    };
    Ok((true, action_error))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let err = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "boom");

        let err = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "code 7");

        let err = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "unknown panic");
    }
}
