//! Supervisor tests against a fake broker and shell-script plugins

#![cfg(unix)]

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sm_core::config::RestartPolicy;
use sm_core::{
    BrokerSession, CloudApi, ConfigError, ConnectionTypes, InstanceState, RemoteError, Target,
    TunnelError, TunnelState,
};
use sm_tunnel::{TunnelSettings, TunnelSupervisor};

/// Records every call in order
#[derive(Default)]
struct FakeCloud {
    calls: Mutex<Vec<String>>,
    stale: Mutex<Vec<BrokerSession>>,
    issued: AtomicU32,
    refuse_sessions: bool,
    session_error: Option<&'static str>,
}

impl FakeCloud {
    fn with_stale(ids: &[&str]) -> Self {
        Self {
            stale: Mutex::new(ids.iter().map(|id| BrokerSession::from_id(*id)).collect()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn describe_instance_status(&self, _: &Target) -> Result<InstanceState, RemoteError> {
        Ok(InstanceState::Running)
    }

    async fn start_instance(&self, _: &Target) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn stop_instance(&self, _: &Target) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn describe_active_sessions(
        &self,
        _: &Target,
    ) -> Result<Vec<BrokerSession>, RemoteError> {
        self.record("describe_sessions");
        Ok(std::mem::take(&mut *self.stale.lock().unwrap()))
    }

    async fn start_session(&self, _: &Target) -> Result<Option<BrokerSession>, RemoteError> {
        self.record("start_session");
        if let Some(message) = self.session_error {
            return Err(RemoteError::from_message(
                "start_session",
                message.to_string(),
                message,
            ));
        }
        if self.refuse_sessions {
            return Ok(None);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(BrokerSession {
            session_id: format!("s-{}", n),
            token_value: Some(format!("token-{}", n)),
            stream_url: Some("wss://ssmmessages.example/stream".to_string()),
        }))
    }

    async fn terminate_session(
        &self,
        _: &Target,
        session: &BrokerSession,
    ) -> Result<(), RemoteError> {
        self.record(format!("terminate {}", session.session_id));
        Ok(())
    }
}

fn target() -> Target {
    Target::new(
        "desktop",
        "i-01234567890abcdef",
        "us-west-1",
        "rdp",
        &ConnectionTypes::default(),
    )
    .unwrap()
    .with_local_port(55555)
}

fn write_plugin(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("session-manager-plugin");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn supervisor(cloud: Arc<FakeCloud>, plugin: PathBuf, restart: RestartPolicy) -> TunnelSupervisor {
    let settings = TunnelSettings {
        plugin_path: Some(plugin),
        ready_timeout: Duration::from_secs(10),
        restart,
        ..TunnelSettings::new("work")
    };
    TunnelSupervisor::new(cloud, target(), settings)
}

async fn wait_for_state(sup: &TunnelSupervisor, state: TunnelState) {
    let mut rx = sup.subscribe();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .unwrap();
}

const READY_PLUGIN: &str = "echo 'Starting session with SessionId: s-1'\n\
                            echo 'Waiting for connections...'\n\
                            exec sleep 30";

#[tokio::test]
async fn test_ready_then_stop_terminates_session() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), READY_PLUGIN),
        RestartPolicy::default(),
    );

    sup.start().unwrap();
    assert!(sup.is_ready().await);
    assert_eq!(sup.state(), TunnelState::Ready);
    assert!(sup.is_running());

    sup.stop().await;
    assert_eq!(sup.state(), TunnelState::Stopped);
    assert!(!sup.is_running());
    assert_eq!(
        cloud.calls(),
        vec!["describe_sessions", "start_session", "terminate s-1"]
    );

    let tracked = sup.tracked_sessions();
    assert_eq!(tracked.len(), 1);
    assert!(tracked[0].terminated);

    // A second stop has nothing left to do.
    sup.stop().await;
    assert_eq!(cloud.count("terminate"), 1);
}

#[tokio::test]
async fn test_stale_sessions_terminated_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud::with_stale(&["old-1", "old-2"]));
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), READY_PLUGIN),
        RestartPolicy::default(),
    );

    sup.start().unwrap();
    assert!(sup.is_ready().await);
    sup.stop().await;

    assert_eq!(
        cloud.calls(),
        vec![
            "describe_sessions",
            "terminate old-1",
            "terminate old-2",
            "start_session",
            "terminate s-1",
        ]
    );
}

#[tokio::test]
async fn test_restarts_after_unexpected_exit() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran-once");
    let body = format!(
        "echo 'Waiting for connections...'\n\
         if [ -f '{marker}' ]; then exec sleep 30; fi\n\
         touch '{marker}'\n\
         exit 0",
        marker = marker.display()
    );
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), &body),
        RestartPolicy::default(),
    );

    sup.start().unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while !(cloud.count("start_session") >= 2 && sup.state() == TunnelState::Ready) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("plugin was not restarted");

    assert!(sup.is_ready().await);
    sup.stop().await;

    // The first session is cleaned up when the second cycle begins, the
    // second one on stop, each exactly once.
    assert_eq!(
        cloud.calls(),
        vec![
            "describe_sessions",
            "start_session",
            "describe_sessions",
            "terminate s-1",
            "start_session",
            "terminate s-2",
        ]
    );
}

#[tokio::test]
async fn test_readiness_cleared_until_restarted_plugin_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran-once");
    // Ready then exit on the first run; the restarted plugin never reports
    // readiness.
    let body = format!(
        "if [ -f '{marker}' ]; then exec sleep 30; fi\n\
         touch '{marker}'\n\
         echo 'Waiting for connections...'\n\
         exit 0",
        marker = marker.display()
    );
    let cloud = Arc::new(FakeCloud::default());
    let settings = TunnelSettings {
        plugin_path: Some(write_plugin(dir.path(), &body)),
        ready_timeout: Duration::from_millis(300),
        restart: RestartPolicy::default(),
        ..TunnelSettings::new("work")
    };
    let sup = TunnelSupervisor::new(cloud.clone(), target(), settings);

    sup.start().unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while !(cloud.count("start_session") >= 2 && sup.is_running()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("plugin was not restarted");

    assert_ne!(sup.state(), TunnelState::Ready);
    assert!(!sup.is_ready().await);
    assert_eq!(sup.state(), TunnelState::Starting);
    assert_eq!(cloud.count("start_session"), 2);

    sup.stop().await;
    assert_eq!(sup.state(), TunnelState::Stopped);
    assert_eq!(cloud.count("terminate"), 2);
}

#[tokio::test]
async fn test_restart_cap_ends_in_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), "exit 1"),
        RestartPolicy {
            max_restarts: Some(2),
            backoff: None,
        },
    );

    sup.start().unwrap();
    wait_for_state(&sup, TunnelState::Stopped).await;

    assert!(!sup.is_ready().await);
    assert_eq!(cloud.count("start_session"), 3);

    sup.stop().await;
    let tracked = sup.tracked_sessions();
    assert_eq!(tracked.len(), 3);
    assert!(tracked.iter().all(|t| t.terminated));
    assert_eq!(cloud.count("terminate"), 3);
}

#[tokio::test]
async fn test_failure_marker_is_not_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud.clone(),
        write_plugin(
            dir.path(),
            "echo 'Cannot perform start session: EOF' >&2\nexit 1",
        ),
        RestartPolicy {
            max_restarts: Some(0),
            backoff: None,
        },
    );

    sup.start().unwrap();
    assert!(!sup.is_ready().await);
    assert_eq!(sup.state(), TunnelState::Stopped);
    sup.stop().await;
}

#[tokio::test]
async fn test_refused_session_stops_without_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud {
        refuse_sessions: true,
        ..Default::default()
    });
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), READY_PLUGIN),
        RestartPolicy::default(),
    );

    sup.start().unwrap();
    assert!(!sup.is_ready().await);
    assert_eq!(sup.state(), TunnelState::Stopped);
    assert_eq!(cloud.count("start_session"), 1);
    assert!(!sup.is_running());
}

#[tokio::test]
async fn test_classified_broker_error_stops_loop() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud {
        session_error: Some("TargetNotConnected: i-01234567890abcdef is not connected"),
        ..Default::default()
    });
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), READY_PLUGIN),
        RestartPolicy::default(),
    );

    sup.start().unwrap();
    wait_for_state(&sup, TunnelState::Stopped).await;
    assert!(!sup.is_ready().await);
    assert_eq!(cloud.count("start_session"), 1);
}

#[tokio::test]
async fn test_plugin_receives_arguments_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args");
    let body = format!(
        "for arg in \"$@\"; do echo \"$arg\" >> '{}'; done\n{}",
        args_file.display(),
        READY_PLUGIN
    );
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud.clone(),
        write_plugin(dir.path(), &body),
        RestartPolicy::default(),
    );

    sup.start().unwrap();
    assert!(sup.is_ready().await);
    sup.stop().await;

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        args,
        vec![
            r#"{"SessionId":"s-1","TokenValue":"token-1","StreamUrl":"wss://ssmmessages.example/stream"}"#,
            "us-west-1",
            "StartSession",
            "work",
            r#"{"Target":"i-01234567890abcdef"}"#,
            "https://ssm.us-west-1.amazonaws.com",
        ]
    );
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud,
        write_plugin(dir.path(), READY_PLUGIN),
        RestartPolicy::default(),
    );

    sup.start().unwrap();
    assert!(matches!(sup.start(), Err(TunnelError::AlreadyStarted)));
    sup.stop().await;
}

#[tokio::test]
async fn test_missing_plugin_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(FakeCloud::default());
    let sup = supervisor(
        cloud.clone(),
        dir.path().join("not-installed"),
        RestartPolicy::default(),
    );

    let err = sup.start().unwrap_err();
    assert!(matches!(
        err,
        TunnelError::Config(ConfigError::PluginNotFound(_))
    ));
    assert!(cloud.calls().is_empty());
}
