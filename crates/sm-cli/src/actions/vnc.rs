//! VNC viewer launcher

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;

use sm_core::Target;
use sm_orchestrator::ConnectAction;
use sm_tunnel::TunnelSupervisor;

use super::{hold_open, open_with_default_app};
use crate::output::print_info;

/// Writes a `.vnc` file for the tunnel and opens it
pub struct VncAction {
    session_dir: PathBuf,
}

impl VncAction {
    pub fn new(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }
}

pub fn render_vnc(target: &Target) -> String {
    format!(
        "[Connection]\nHost=localhost:{}\n",
        target.local_port()
    )
}

#[async_trait]
impl ConnectAction for VncAction {
    async fn connect(&self, target: &Target, tunnel: &TunnelSupervisor) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.session_dir)
            .with_context(|| format!("Failed to create {}", self.session_dir.display()))?;
        let path = self.session_dir.join(format!("{}.vnc", target.name()));
        std::fs::write(&path, render_vnc(target))
            .with_context(|| format!("Failed to write {}", path.display()))?;

        print_info(&format!(
            "Launching VNC client...\nIf the client fails to start or you would like to use a \
             different one, connect to localhost:{}.",
            target.local_port()
        ));

        open_with_default_app(&path).await?;
        hold_open(tunnel).await;
        Ok(())
    }
}
