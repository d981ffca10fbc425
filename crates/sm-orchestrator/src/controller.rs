//! Remote instance state controller
//!
//! `ensure` reads the instance's power state and walks it towards what the
//! caller intends:
//!
//! | Current  | Intent     | Action                                        |
//! |----------|------------|-----------------------------------------------|
//! | Stopping | any        | poll until stopped, settle                    |
//! | Stopped  | Connecting | start                                         |
//! | Stopped  | Stopping   | nothing                                       |
//! | Stopped  | None       | ask the policy: start or abort                |
//! | Pending  | any        | poll until running, settle if connecting      |
//! | Running  | Connecting | nothing                                       |
//! | Running  | Stopping   | stop                                          |
//! | Running  | None       | ask the policy: stop, restart or abort        |
//!
//! The controller never assumes a state it has not read back from the
//! remote API.

use async_trait::async_trait;
use std::sync::Arc;

use sm_core::config::TimingConfig;
use sm_core::{ApiErrorKind, CloudApi, InstanceState, RemoteError, Target};

/// What the caller wants the instance to end up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Leave the decision to the [`StatePolicy`]
    None,
    /// Bring the instance up for a connection
    Connecting,
    /// Shut the instance down
    Stopping,
}

/// Result of [`RemoteStateController::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    /// The intent was satisfied; `started` is set if this call started the
    /// instance
    Ready { started: bool },
    /// The policy chose to leave the instance alone
    Aborted,
    /// A classified remote failure ended the attempt
    Failed(ApiErrorKind),
}

impl StateOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, StateOutcome::Ready { .. })
    }
}

/// Choice offered for a stopped instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppedDecision {
    Start,
    Abort,
}

/// Choice offered for a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningDecision {
    Stop,
    Restart,
    Abort,
}

/// Decides what to do with an instance when no intent was given
#[async_trait]
pub trait StatePolicy: Send + Sync {
    async fn on_stopped(&self, target: &Target) -> StoppedDecision;

    async fn on_running(&self, target: &Target) -> RunningDecision;
}

/// Policy that always leaves the instance as it is
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortPolicy;

#[async_trait]
impl StatePolicy for AbortPolicy {
    async fn on_stopped(&self, _target: &Target) -> StoppedDecision {
        StoppedDecision::Abort
    }

    async fn on_running(&self, _target: &Target) -> RunningDecision {
        RunningDecision::Abort
    }
}

/// Drives one instance's power state through the remote API
pub struct RemoteStateController {
    cloud: Arc<dyn CloudApi>,
    timing: TimingConfig,
    policy: Arc<dyn StatePolicy>,
}

impl RemoteStateController {
    pub fn new(
        cloud: Arc<dyn CloudApi>,
        timing: TimingConfig,
        policy: Arc<dyn StatePolicy>,
    ) -> Self {
        Self {
            cloud,
            timing,
            policy,
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Drive `target` towards `intent`.
    ///
    /// Classified remote failures are logged and reported as
    /// [`StateOutcome::Failed`]; unclassified ones are returned as errors.
    pub async fn ensure(
        &self,
        target: &Target,
        intent: Intent,
    ) -> Result<StateOutcome, RemoteError> {
        match self.drive(target, intent).await {
            Ok(outcome) => Ok(outcome),
            Err(RemoteError::Api {
                kind,
                operation,
                message,
            }) => {
                tracing::error!("{} ({} failed: {})", kind.describe(), operation, message);
                Ok(StateOutcome::Failed(kind))
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&self, target: &Target, intent: Intent) -> Result<StateOutcome, RemoteError> {
        let mut started = false;
        let mut state = self.cloud.describe_instance_status(target).await?;
        tracing::debug!("{} is {}", target, state);

        loop {
            match (state, intent) {
                (InstanceState::Unknown, _) => {
                    tracing::error!("{} is in a state that cannot be managed", target);
                    return Ok(StateOutcome::Failed(ApiErrorKind::InvalidState));
                }

                (InstanceState::Stopping, _) => {
                    state = self.wait_until_stopped(target).await?;
                }

                (InstanceState::Stopped, Intent::Stopping) => {
                    return Ok(StateOutcome::Ready { started });
                }
                (InstanceState::Stopped, Intent::Connecting) => {
                    self.cloud.start_instance(target).await?;
                    started = true;
                    state = InstanceState::Pending;
                }
                (InstanceState::Stopped, Intent::None) => {
                    match self.policy.on_stopped(target).await {
                        StoppedDecision::Start => {
                            self.cloud.start_instance(target).await?;
                            started = true;
                            state = InstanceState::Pending;
                        }
                        StoppedDecision::Abort => return Ok(StateOutcome::Aborted),
                    }
                }

                (InstanceState::Pending, _) => {
                    tracing::info!("Waiting for {} to start...", target);
                    state = self.poll_until(target, InstanceState::Running).await?;
                    if state != InstanceState::Running {
                        continue;
                    }
                    if intent == Intent::Connecting {
                        tracing::info!(
                            "Giving {} {:?} to finish booting",
                            target,
                            self.timing.boot_settle
                        );
                        tokio::time::sleep(self.timing.boot_settle).await;
                    }
                    // The policy already chose to start it in this call.
                    if started && intent == Intent::None {
                        return Ok(StateOutcome::Ready { started });
                    }
                }

                (InstanceState::Running, Intent::Connecting) => {
                    return Ok(StateOutcome::Ready { started });
                }
                (InstanceState::Running, Intent::Stopping) => {
                    self.cloud.stop_instance(target).await?;
                    return Ok(StateOutcome::Ready { started });
                }
                (InstanceState::Running, Intent::None) => {
                    match self.policy.on_running(target).await {
                        RunningDecision::Stop => {
                            self.cloud.stop_instance(target).await?;
                            return Ok(StateOutcome::Ready { started });
                        }
                        RunningDecision::Restart => {
                            self.cloud.stop_instance(target).await?;
                            state = self.wait_until_stopped(target).await?;
                            if state == InstanceState::Stopped {
                                self.cloud.start_instance(target).await?;
                                started = true;
                                state = InstanceState::Pending;
                            }
                        }
                        RunningDecision::Abort => return Ok(StateOutcome::Aborted),
                    }
                }
            }
        }
    }

    /// Poll until stopped, then give the instance time to settle
    async fn wait_until_stopped(&self, target: &Target) -> Result<InstanceState, RemoteError> {
        tracing::info!("Waiting for {} to stop...", target);
        let state = self.poll_until(target, InstanceState::Stopped).await?;
        if state == InstanceState::Stopped {
            tokio::time::sleep(self.timing.stop_settle).await;
        }
        Ok(state)
    }

    /// Poll every interval until the instance reports `want`.
    ///
    /// Also returns early on `Unknown`, which no amount of waiting fixes.
    async fn poll_until(
        &self,
        target: &Target,
        want: InstanceState,
    ) -> Result<InstanceState, RemoteError> {
        loop {
            tokio::time::sleep(self.timing.poll_interval).await;
            let state = self.cloud.describe_instance_status(target).await?;
            tracing::debug!("{} is {}", target, state);
            if state == want || state == InstanceState::Unknown {
                return Ok(state);
            }
        }
    }
}
