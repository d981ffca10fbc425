//! OpenSSH client in the foreground

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use sm_core::Target;
use sm_orchestrator::ConnectAction;
use sm_tunnel::TunnelSupervisor;

use crate::output::print_info;

#[cfg(windows)]
const NULL_KNOWN_HOSTS: &str = "NUL";
#[cfg(not(windows))]
const NULL_KNOWN_HOSTS: &str = "/dev/null";

/// Runs `ssh` against the tunnel, reconnecting while the tunnel restarts
pub struct SshAction {
    program: PathBuf,
}

impl SshAction {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SshAction {
    fn default() -> Self {
        Self::new("ssh")
    }
}

/// Client arguments for the local end of the tunnel.
///
/// The forwarded host key changes with every instance, so host key checks
/// are disabled and nothing is recorded.
pub fn ssh_args(target: &Target) -> Vec<String> {
    let destination = match target.username() {
        Some(user) => format!("{}@localhost", user),
        None => "localhost".to_string(),
    };
    vec![
        destination,
        "-p".to_string(),
        target.local_port().to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        format!("UserKnownHostsFile={}", NULL_KNOWN_HOSTS),
    ]
}

#[async_trait]
impl ConnectAction for SshAction {
    async fn connect(&self, target: &Target, tunnel: &TunnelSupervisor) -> anyhow::Result<()> {
        let args = ssh_args(target);
        print_info(&format!(
            "Dropping into SSH...\nIf the client fails to start or you would like to use a \
             different one, connect to {}:{}.\nPlease do not close this terminal. Use 'exit' \
             to end the session gracefully.",
            args[0],
            target.local_port()
        ));

        loop {
            let status = Command::new(&self.program)
                .args(&args)
                .status()
                .await
                .with_context(|| format!("Failed to run {}", self.program.display()))?;

            if status.success() {
                return Ok(());
            }

            // With the plugin still up the tunnel was fine, so the failure
            // was the login itself.
            if tunnel.is_running() {
                bail!("Could not connect via SSH ({}). Check your credentials.", status);
            }

            tracing::warn!("SSH exited with {} while the tunnel was down", status);
            if !tunnel.is_ready().await {
                bail!("Tunnel to {} did not come back", target.name());
            }
            tracing::info!("Tunnel is back, reconnecting SSH");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::ConnectionTypes;

    fn target(username: Option<&str>) -> Target {
        Target::new(
            "builder",
            "i-01234567890abcdef",
            "us-west-1",
            "ssh",
            &ConnectionTypes::default(),
        )
        .unwrap()
        .with_local_port(50022)
        .with_username(username.map(str::to_string))
    }

    #[test]
    fn test_ssh_args_with_user() {
        let args = ssh_args(&target(Some("ec2-user")));
        assert_eq!(args[0], "ec2-user@localhost");
        assert_eq!(args[1..3], ["-p".to_string(), "50022".to_string()]);
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
    }

    #[test]
    fn test_ssh_args_without_user() {
        assert_eq!(ssh_args(&target(None))[0], "localhost");
    }
}
