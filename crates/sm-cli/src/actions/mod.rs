//! Connect actions launched against an open tunnel
//!
//! `rdp` and `vnc` write a connection file and hand it to the desktop's
//! default handler, then keep the tunnel open until the operator is done.
//! `ssh` runs the OpenSSH client in the foreground and retries while the
//! tunnel restarts. Any other connection type just holds the tunnel open.

mod launch;
mod rdp;
mod ssh;
mod vnc;

pub use launch::{hold_open, open_with_default_app};
pub use rdp::{render_rdp, RdpAction};
pub use ssh::{ssh_args, SshAction};
pub use vnc::{render_vnc, VncAction};

use std::path::PathBuf;

use async_trait::async_trait;
use sm_core::Target;
use sm_orchestrator::ConnectAction;
use sm_tunnel::TunnelSupervisor;

use crate::output::print_info;

/// Pick the action for a target's connection type
pub fn for_target(target: &Target, session_dir: PathBuf) -> Box<dyn ConnectAction> {
    match target.connection_type() {
        "rdp" => Box::new(RdpAction::new(session_dir)),
        "vnc" => Box::new(VncAction::new(session_dir)),
        "ssh" => Box::new(SshAction::default()),
        _ => Box::new(HoldOpenAction),
    }
}

/// Leaves the tunnel up for whatever client the operator chooses
pub struct HoldOpenAction;

#[async_trait]
impl ConnectAction for HoldOpenAction {
    async fn connect(&self, target: &Target, tunnel: &TunnelSupervisor) -> anyhow::Result<()> {
        print_info(&format!(
            "Tunnel open: connect to localhost:{} ({} port {} on {})",
            target.local_port(),
            target.connection_type(),
            target.remote_port(),
            target.name()
        ));
        hold_open(tunnel).await;
        Ok(())
    }
}
