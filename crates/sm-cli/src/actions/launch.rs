//! Launching desktop clients

use anyhow::{bail, Context};
use std::path::Path;
use tokio::process::Command;

use sm_core::TunnelState;
use sm_tunnel::TunnelSupervisor;

use crate::output::print_info;

/// Open `path` with the desktop's default handler for its file type
pub async fn open_with_default_app(path: &Path) -> anyhow::Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };

    let status = cmd
        .arg(path)
        .status()
        .await
        .with_context(|| format!("Failed to launch a handler for {}", path.display()))?;

    if !status.success() {
        let kind = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        bail!(
            "No default app found for .{} files. Please set one and try again.",
            kind
        );
    }
    Ok(())
}

/// Keep the tunnel up until Enter, Ctrl-C, or the tunnel stopping by itself
pub async fn hold_open(tunnel: &TunnelSupervisor) {
    print_info("Press Enter or Ctrl-C to close the tunnel.");

    // Detached: a pending stdin read must not block process exit.
    let (entered, enter) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = entered.send(());
    });

    let mut state = tunnel.subscribe();
    tokio::select! {
        _ = enter => {}
        _ = tokio::signal::ctrl_c() => {}
        _ = state.wait_for(|s| *s == TunnelState::Stopped) => {
            tracing::warn!("Tunnel to {} stopped", tunnel.target().name());
        }
    }
}
