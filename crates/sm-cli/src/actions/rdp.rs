//! Remote Desktop launcher

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;

use sm_core::Target;
use sm_orchestrator::ConnectAction;
use sm_tunnel::TunnelSupervisor;

use super::{hold_open, open_with_default_app};
use crate::output::print_info;

/// Writes a `.rdp` file for the tunnel and opens it
pub struct RdpAction {
    session_dir: PathBuf,
}

impl RdpAction {
    pub fn new(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }
}

/// Connection file contents pointing at the local end of the tunnel
pub fn render_rdp(target: &Target) -> String {
    let mut lines = vec![
        format!("full address:s:localhost:{}", target.local_port()),
        "prompt for credentials:i:1".to_string(),
        "administrative session:i:0".to_string(),
        "screen mode id:i:2".to_string(),
        "session bpp:i:32".to_string(),
        "authentication level:i:2".to_string(),
        "redirectclipboard:i:1".to_string(),
    ];
    if let Some(user) = target.full_username() {
        lines.insert(1, format!("username:s:{}", user));
    }
    lines.join("\r\n") + "\r\n"
}

/// `.rdp` files are conventionally UTF-16LE with a byte-order mark
fn utf16le(content: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in content.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

#[async_trait]
impl ConnectAction for RdpAction {
    async fn connect(&self, target: &Target, tunnel: &TunnelSupervisor) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.session_dir)
            .with_context(|| format!("Failed to create {}", self.session_dir.display()))?;
        let path = self.session_dir.join(format!("{}.rdp", target.name()));
        std::fs::write(&path, utf16le(&render_rdp(target)))
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let user = target.full_username().unwrap_or_else(|| "your user".to_string());
        print_info(&format!(
            "Launching RDP client...\nIf the client fails to start or you would like to use a \
             different one, connect to localhost:{} as {}.",
            target.local_port(),
            user
        ));

        open_with_default_app(&path).await?;
        hold_open(tunnel).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::ConnectionTypes;

    fn target() -> Target {
        Target::new(
            "desktop",
            "i-01234567890abcdef",
            "us-west-1",
            "rdp",
            &ConnectionTypes::default(),
        )
        .unwrap()
        .with_local_port(53389)
    }

    #[test]
    fn test_render_with_domain_user() {
        let target = target()
            .with_domain(Some("corp".into()))
            .with_username(Some("alice".into()));
        let rdp = render_rdp(&target);

        let lines: Vec<&str> = rdp.lines().collect();
        assert_eq!(lines[0], "full address:s:localhost:53389");
        assert_eq!(lines[1], "username:s:corp\\alice");
        assert!(rdp.ends_with("\r\n"));
    }

    #[test]
    fn test_render_without_user() {
        let rdp = render_rdp(&target());
        assert!(!rdp.contains("username:s:"));
    }

    #[test]
    fn test_utf16le_has_bom() {
        let bytes = utf16le("ab");
        assert_eq!(bytes, vec![0xFF, 0xFE, b'a', 0, b'b', 0]);
    }
}
