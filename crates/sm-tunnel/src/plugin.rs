//! Session Manager plugin invocation
//!
//! The plugin is an opaque executable. Summoner only depends on its argument
//! order and on two substrings of its output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use sm_core::{BrokerSession, ConfigError, Target, TunnelError};

/// Executable name looked up on PATH
pub const PLUGIN_EXECUTABLE: &str = "session-manager-plugin";

/// Verb telling the plugin to start a session
pub const START_SESSION_VERB: &str = "StartSession";

/// Output substring meaning the plugin is accepting local connections
pub const READY_MARKER: &str = "Waiting for connections";

/// Output substring meaning the plugin failed to start the session
pub const FAILURE_MARKER: &str = "Cannot perform start session";

/// What a line of plugin output tells us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOutput {
    Ready,
    StartFailure,
    Other,
}

/// Classify one line of plugin output
pub fn classify_line(line: &str) -> PluginOutput {
    if line.contains(FAILURE_MARKER) {
        PluginOutput::StartFailure
    } else if line.contains(READY_MARKER) {
        PluginOutput::Ready
    } else {
        PluginOutput::Other
    }
}

/// Locate the plugin executable.
///
/// A configured path must exist; otherwise every PATH entry is searched.
pub fn resolve_executable(configured: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = configured {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ConfigError::PluginNotFound(path.display().to_string()))
        };
    }

    let file_name = if cfg!(windows) {
        format!("{}.exe", PLUGIN_EXECUTABLE)
    } else {
        PLUGIN_EXECUTABLE.to_string()
    };

    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(&file_name))
                .find(|candidate| candidate.is_file())
        })
        .ok_or_else(|| ConfigError::PluginNotFound(PLUGIN_EXECUTABLE.to_string()))
}

/// Regional session broker endpoint
pub fn ssm_endpoint(region: &str) -> String {
    let domain = if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    };
    format!("https://ssm.{}.{}", region, domain)
}

/// Arguments in the order the plugin expects them
pub fn plugin_args(
    session: &BrokerSession,
    target: &Target,
    profile: &str,
) -> Result<Vec<String>, TunnelError> {
    Ok(vec![
        serde_json::to_string(session)?,
        target.region().to_string(),
        START_SESSION_VERB.to_string(),
        profile.to_string(),
        serde_json::json!({ "Target": target.instance_id().as_str() }).to_string(),
        ssm_endpoint(target.region()),
    ])
}

/// Build the plugin command with both output streams piped.
///
/// The child is killed if its handle is dropped.
pub fn command(
    program: &Path,
    session: &BrokerSession,
    target: &Target,
    profile: &str,
) -> Result<Command, TunnelError> {
    let args = plugin_args(session, target, profile)?;
    tracing::debug!("Session manager plugin command: {:?} {:?}", program, args);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(cmd)
}
