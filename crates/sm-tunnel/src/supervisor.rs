//! Tunnel supervisor
//!
//! Runs the session-manager-plugin for one [`Target`] in a background task:
//!
//! ```text
//! Idle -> Starting -> Ready
//!            ^          |
//!            |          v (plugin exited on its own)
//!            +----- Restarting
//!
//! any -> Stopped (stop(), refused session, remote failure, restart cap)
//! ```
//!
//! Every broker session the supervisor sees, whether it opened it or found
//! it lingering on the instance, is tracked and terminated exactly once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sm_core::config::{AccountConfig, RestartPolicy, TimingConfig};
use sm_core::{BrokerSession, CloudApi, RemoteError, Target, TunnelError, TunnelState};

use crate::backoff::RestartBackoff;
use crate::plugin::{self, PluginOutput};

/// Settings for one supervisor
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// Credential profile name handed to the plugin
    pub profile: String,
    /// Explicit plugin executable; PATH is searched when unset
    pub plugin_path: Option<PathBuf>,
    /// How long [`TunnelSupervisor::is_ready`] waits
    pub ready_timeout: Duration,
    /// Behaviour after the plugin exits on its own
    pub restart: RestartPolicy,
}

impl TunnelSettings {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            plugin_path: None,
            ready_timeout: TimingConfig::default().ready_timeout,
            restart: RestartPolicy::default(),
        }
    }

    pub fn from_account(account: &AccountConfig) -> Self {
        Self {
            profile: account.profile.clone(),
            plugin_path: account.tunnel.plugin_path.clone(),
            ready_timeout: account.timing.ready_timeout,
            restart: account.tunnel.restart.clone(),
        }
    }
}

/// A broker session seen during this supervisor's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSession {
    pub session: BrokerSession,
    pub terminated: bool,
}

/// State shared between the supervisor handle and its loop task
struct Shared {
    cloud: Arc<dyn CloudApi>,
    target: Target,
    state: watch::Sender<TunnelState>,
    cancel: CancellationToken,
    sessions: Mutex<Vec<TrackedSession>>,
    child: Mutex<Option<Child>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the broker sessions and plugin process of one connection attempt
pub struct TunnelSupervisor {
    shared: Arc<Shared>,
    settings: TunnelSettings,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl TunnelSupervisor {
    pub fn new(cloud: Arc<dyn CloudApi>, target: Target, settings: TunnelSettings) -> Self {
        let (state, _) = watch::channel(TunnelState::Idle);
        Self {
            shared: Arc::new(Shared {
                cloud,
                target,
                state,
                cancel: CancellationToken::new(),
                sessions: Mutex::new(Vec::new()),
                child: Mutex::new(None),
            }),
            settings,
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Start the supervisory loop in the background.
    ///
    /// Fails if the plugin executable cannot be found or if the supervisor
    /// was already started. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), TunnelError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TunnelError::AlreadyStarted);
        }

        let program = match plugin::resolve_executable(self.settings.plugin_path.as_deref()) {
            Ok(program) => program,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        tracing::info!(
            "Opening tunnel to {} on localhost:{}",
            self.shared.target,
            self.shared.target.local_port()
        );

        let shared = Arc::clone(&self.shared);
        let settings = self.settings.clone();
        let handle = tokio::spawn(async move { shared.run(program, settings).await });
        *lock(&self.task) = Some(handle);
        Ok(())
    }

    /// Wait up to the ready timeout for the plugin to accept connections.
    ///
    /// Returns `false` straight away once the supervisor has stopped.
    pub async fn is_ready(&self) -> bool {
        let mut rx = self.shared.state.subscribe();
        let waited = tokio::time::timeout(
            self.settings.ready_timeout,
            rx.wait_for(|state| matches!(state, TunnelState::Ready | TunnelState::Stopped)),
        )
        .await;

        match waited {
            Ok(Ok(state)) => *state == TunnelState::Ready,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!(
                    "Tunnel to {} not ready after {:?}",
                    self.shared.target,
                    self.settings.ready_timeout
                );
                false
            }
        }
    }

    /// Whether a plugin process is currently alive
    pub fn is_running(&self) -> bool {
        match lock(&self.shared.child).as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the loop, kill the plugin and terminate every outstanding
    /// broker session. Safe to call more than once, or before `start()`.
    pub async fn stop(&self) {
        self.shared.cancel.cancel();

        if let Some(child) = lock(&self.shared.child).as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Plugin already gone: {}", e);
            }
        }

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Tunnel task for {} failed: {}", self.shared.target, e);
            }
        }

        self.shared.terminate_outstanding().await;
        self.shared.set_state(TunnelState::Stopped);
    }

    /// Current tunnel state
    pub fn state(&self) -> TunnelState {
        *self.shared.state.borrow()
    }

    /// Watch tunnel state transitions
    pub fn subscribe(&self) -> watch::Receiver<TunnelState> {
        self.shared.state.subscribe()
    }

    /// Snapshot of every session seen so far, in the order first seen
    pub fn tracked_sessions(&self) -> Vec<TrackedSession> {
        lock(&self.shared.sessions).clone()
    }

    pub fn target(&self) -> &Target {
        &self.shared.target
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(child) = lock(&self.shared.child).as_mut() {
            let _ = child.start_kill();
        }

        let outstanding = lock(&self.shared.sessions).iter().any(|t| !t.terminated);
        if outstanding {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let shared = Arc::clone(&self.shared);
                    handle.spawn(async move { shared.terminate_outstanding().await });
                }
                Err(_) => tracing::warn!(
                    "Supervisor for {} dropped outside a runtime; broker sessions left open",
                    self.shared.target
                ),
            }
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>, program: PathBuf, settings: TunnelSettings) {
        let mut restarts = 0u32;
        let mut backoff = settings.restart.backoff.clone().map(RestartBackoff::new);

        while !self.cancel.is_cancelled() {
            self.set_state(TunnelState::Starting);

            let session = match self.open_session().await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    tracing::error!("Session broker refused a session for {}", self.target);
                    break;
                }
                Err(e) => {
                    log_remote_error(&e);
                    break;
                }
            };

            let reached_ready = match self
                .run_plugin(&program, &session, &settings.profile)
                .await
            {
                Ok(ready) => ready,
                Err(e) => {
                    tracing::error!("{}", e);
                    break;
                }
            };

            if self.cancel.is_cancelled() {
                break;
            }

            tracing::warn!(
                "session-manager-plugin for {} exited unexpectedly",
                self.target
            );
            self.set_state(TunnelState::Restarting);

            if !settings.restart.allows(restarts) {
                tracing::error!(
                    "Giving up on {} after {} restarts",
                    self.target,
                    restarts
                );
                break;
            }
            restarts += 1;

            if let Some(backoff) = backoff.as_mut() {
                if reached_ready {
                    backoff.reset();
                }
                let delay = backoff.next_delay();
                tracing::info!("Restarting tunnel in {:?}", delay);
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                tracing::info!("Restarting tunnel to {}", self.target);
            }
        }

        if self.cancel.is_cancelled() {
            self.terminate_outstanding().await;
        }
        self.set_state(TunnelState::Stopped);
        tracing::debug!("Tunnel loop for {} finished", self.target);
    }

    /// Clear out stale sessions, then ask the broker for a fresh one
    async fn open_session(&self) -> Result<Option<BrokerSession>, RemoteError> {
        let stale = self.cloud.describe_active_sessions(&self.target).await?;
        if !stale.is_empty() {
            tracing::info!(
                "Found {} active session(s) on {}, terminating",
                stale.len(),
                self.target
            );
        }
        self.track(stale);
        self.terminate_outstanding().await;

        let session = self.cloud.start_session(&self.target).await?;
        if let Some(session) = &session {
            tracing::debug!("Started broker session {}", session.session_id);
            self.track(std::iter::once(session.clone()));
        }
        Ok(session)
    }

    /// Run one plugin process to completion.
    ///
    /// Returns whether it reported readiness before exiting.
    async fn run_plugin(
        &self,
        program: &Path,
        session: &BrokerSession,
        profile: &str,
    ) -> Result<bool, TunnelError> {
        let mut child = plugin::command(program, session, &self.target, profile)?
            .spawn()
            .map_err(TunnelError::Spawn)?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                return Err(TunnelError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "plugin output was not captured",
                )))
            }
        };
        *lock(&self.child) = Some(child);

        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let (mut stdout_open, mut stderr_open) = (true, true);
        let mut reached_ready = false;

        while stdout_open || stderr_open {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => reached_ready |= self.handle_line(&line),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        tracing::debug!("Stopped reading plugin stdout: {}", e);
                        stdout_open = false;
                    }
                },
                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => reached_ready |= self.handle_line(&line),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::debug!("Stopped reading plugin stderr: {}", e);
                        stderr_open = false;
                    }
                },
            }
        }

        let child = lock(&self.child).take();
        if let Some(mut child) = child {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("Failed to kill plugin: {}", e);
                    }
                }
                status = child.wait() => match status {
                    Ok(status) => tracing::debug!("session-manager-plugin exited with {}", status),
                    Err(e) => tracing::warn!("Failed to wait for plugin: {}", e),
                },
            }
        }

        Ok(reached_ready)
    }

    /// Log one plugin output line; returns true if it signalled readiness
    fn handle_line(&self, line: &str) -> bool {
        tracing::debug!("session-manager-plugin: {}", line);
        match plugin::classify_line(line) {
            PluginOutput::StartFailure => {
                tracing::error!("Could not start session to {}: {}", self.target, line);
                false
            }
            PluginOutput::Ready => {
                tracing::info!(
                    "Tunnel ready on localhost:{}",
                    self.target.local_port()
                );
                self.set_state(TunnelState::Ready);
                true
            }
            PluginOutput::Other => false,
        }
    }

    fn track(&self, sessions: impl IntoIterator<Item = BrokerSession>) {
        let mut tracked = lock(&self.sessions);
        for session in sessions {
            if tracked
                .iter()
                .any(|t| t.session.session_id == session.session_id)
            {
                continue;
            }
            tracked.push(TrackedSession {
                session,
                terminated: false,
            });
        }
    }

    /// Terminate every tracked session not yet terminated.
    ///
    /// Sessions are claimed under the lock first, so concurrent callers never
    /// terminate the same session twice.
    async fn terminate_outstanding(&self) {
        let claimed: Vec<BrokerSession> = {
            let mut tracked = lock(&self.sessions);
            tracked
                .iter_mut()
                .filter(|t| !t.terminated)
                .map(|t| {
                    t.terminated = true;
                    t.session.clone()
                })
                .collect()
        };

        for session in claimed {
            match self.cloud.terminate_session(&self.target, &session).await {
                Ok(()) => tracing::debug!("Terminated session {}", session.session_id),
                Err(e) => tracing::warn!(
                    "Failed to terminate session {}: {}",
                    session.session_id,
                    e
                ),
            }
        }
    }

    /// Move to `next` unless already there; `Stopped` is final
    fn set_state(&self, next: TunnelState) {
        self.state.send_if_modified(|current| {
            if *current == next || *current == TunnelState::Stopped {
                return false;
            }
            tracing::debug!("Tunnel {}: {} -> {}", self.target, current, next);
            *current = next;
            true
        });
    }
}

fn log_remote_error(err: &RemoteError) {
    match err.kind() {
        Some(kind) => tracing::error!("{}: {}", kind.describe(), err),
        None => tracing::error!("{}", err),
    }
}
