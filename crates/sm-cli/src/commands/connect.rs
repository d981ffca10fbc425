//! `connect` and `manage`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use sm_cloud::{AwsCloud, CredentialProvider, CredentialSettings};
use sm_core::config::default_config_dir;
use sm_core::CloudApi;
use sm_orchestrator::{ConnectionOrchestrator, RemoteStateController};
use sm_tunnel::{plugin, TunnelSettings};

use super::target::{Resolved, TargetArgs};
use crate::actions;
use crate::output::{format_outcome, print_info, print_report, print_success};
use crate::policy::PromptPolicy;

/// Credentials, AWS clients, controller and orchestrator for one account
pub async fn build_orchestrator(
    resolved: &Resolved,
    plugin_path: Option<PathBuf>,
) -> Result<ConnectionOrchestrator> {
    let account = &resolved.account;

    let mut tunnel = TunnelSettings::from_account(account);
    if plugin_path.is_some() {
        tunnel.plugin_path = plugin_path;
    }

    let settings = CredentialSettings {
        // Credentials are scoped to the region the instance lives in.
        region: resolved.target.region().to_string(),
        ..CredentialSettings::from_account(account)
    };
    let credentials = CredentialProvider::initialize(settings).await?;
    tracing::info!("Using credentials from profile '{}'", credentials.profile());

    let cloud: Arc<dyn CloudApi> = Arc::new(AwsCloud::new(Arc::new(credentials)));
    let controller = RemoteStateController::new(
        Arc::clone(&cloud),
        account.timing.clone(),
        Arc::new(PromptPolicy),
    );
    Ok(ConnectionOrchestrator::new(cloud, controller, tunnel))
}

/// Open a tunnel to the target and run the client for its connection type
pub async fn connect_command(args: &TargetArgs, plugin_path: Option<PathBuf>) -> Result<()> {
    let resolved = args.resolve()?;

    // A missing plugin is a setup problem; report it before touching AWS.
    let configured = plugin_path
        .clone()
        .or_else(|| resolved.account.tunnel.plugin_path.clone());
    plugin::resolve_executable(configured.as_deref())?;

    let orchestrator = build_orchestrator(&resolved, plugin_path).await?;
    let target = &resolved.target;
    let action = actions::for_target(target, default_config_dir().join("sessions"));

    print_info(&format!("Connecting to {}...", target));
    let report = orchestrator
        .connect(target, action.as_ref())
        .await
        .with_context(|| format!("Connection to {} failed", target.name()))?;

    print_report(&report);
    Ok(())
}

/// Start, stop or restart the target's instance
pub async fn manage_command(args: &TargetArgs) -> Result<()> {
    let resolved = args.resolve()?;
    let orchestrator = build_orchestrator(&resolved, None).await?;

    let outcome = orchestrator.manage(&resolved.target).await?;
    if outcome.is_ready() {
        print_success(&format!(
            "{}: {}",
            resolved.target.name(),
            format_outcome(&outcome)
        ));
    } else {
        print_info(&format!(
            "{}: {}",
            resolved.target.name(),
            format_outcome(&outcome)
        ));
    }
    Ok(())
}
