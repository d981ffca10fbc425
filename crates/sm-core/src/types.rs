//! Core domain types

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::time::SystemTime;

use crate::error::ConfigError;

/// Range local ports are drawn from when none is configured.
///
/// Ports are chosen uniformly at random, so two concurrent targets can
/// collide; with 10 000 candidates this is rare but not impossible.
pub const LOCAL_PORT_RANGE: Range<u16> = 50000..60000;

/// Opaque cloud instance identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Create a new instance ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Table mapping connection-type names to the remote port they forward to.
///
/// Built once at startup and passed to whatever needs it. Registering a new
/// type produces an extended copy instead of mutating shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionTypes(BTreeMap<String, u16>);

impl Default for ConnectionTypes {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("rdp".to_string(), 3389),
            ("ssh".to_string(), 22),
            ("vnc".to_string(), 5900),
        ]))
    }
}

impl ConnectionTypes {
    /// An empty table
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Return a table extended with (or overriding) `name`
    pub fn with_type(&self, name: impl Into<String>, port: u16) -> Self {
        let mut table = self.0.clone();
        table.insert(name.into().to_lowercase(), port);
        Self(table)
    }

    /// Remote port for a connection type
    pub fn remote_port(&self, name: &str) -> Option<u16> {
        self.0.get(&name.to_lowercase()).copied()
    }

    /// Known connection-type names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether `name` is a known connection type
    pub fn contains(&self, name: &str) -> bool {
        self.remote_port(name).is_some()
    }
}

/// A single connection attempt's destination.
///
/// The remote port is derived from the connection type and the local port is
/// fixed at construction; both stay the same for the life of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    name: String,
    instance_id: InstanceId,
    region: String,
    connection_type: String,
    remote_port: u16,
    local_port: u16,
    domain: Option<String>,
    username: Option<String>,
}

impl Target {
    /// Create a target with a randomly chosen local port
    pub fn new(
        name: impl Into<String>,
        instance_id: impl Into<InstanceId>,
        region: impl Into<String>,
        connection_type: &str,
        types: &ConnectionTypes,
    ) -> Result<Self, ConfigError> {
        let connection_type = connection_type.to_lowercase();
        let remote_port = types
            .remote_port(&connection_type)
            .ok_or_else(|| ConfigError::UnknownConnectionType(connection_type.clone()))?;

        Ok(Self {
            name: name.into(),
            instance_id: instance_id.into(),
            region: region.into(),
            connection_type,
            remote_port,
            local_port: random_local_port(),
            domain: None,
            username: None,
        })
    }

    /// Use a fixed local port instead of the random one
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Set the logon domain
    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain.filter(|d| !d.is_empty());
        self
    }

    /// Set the logon username
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn connection_type(&self) -> &str {
        &self.connection_type
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// `DOMAIN\user` when a domain is set, otherwise the bare username
    pub fn full_username(&self) -> Option<String> {
        match (&self.domain, &self.username) {
            (Some(domain), Some(user)) => Some(format!("{}\\{}", domain, user)),
            (None, Some(user)) => Some(user.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} {} -> localhost:{})",
            self.name, self.instance_id, self.connection_type, self.remote_port, self.local_port
        )
    }
}

/// Pick a local port from [`LOCAL_PORT_RANGE`]
pub fn random_local_port() -> u16 {
    rand::thread_rng().gen_range(LOCAL_PORT_RANGE)
}

/// Short-lived access credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub expiry: SystemTime,
}

impl Credential {
    /// Whether the credential expires at or before `now + margin`
    pub fn expires_within(&self, now: SystemTime, margin: std::time::Duration) -> bool {
        match now.checked_add(margin) {
            Some(deadline) => self.expiry <= deadline,
            None => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// A port-forwarding session created by the session broker.
///
/// Serializes to the JSON shape the companion plugin expects as its first
/// argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerSession {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

impl BrokerSession {
    /// A session known only by its id (as returned by session listings)
    pub fn from_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            token_value: None,
            stream_url: None,
        }
    }
}

/// Instance power state as reported by the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Unknown,
    Stopped,
    Stopping,
    Pending,
    Running,
}

impl InstanceState {
    /// Parse the remote state name; anything unrecognised is `Unknown`
    pub fn from_remote(name: &str) -> Self {
        match name {
            "stopped" => Self::Stopped,
            "stopping" => Self::Stopping,
            "pending" => Self::Pending,
            "running" => Self::Running,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Unknown => write!(f, "unknown"),
            InstanceState::Stopped => write!(f, "stopped"),
            InstanceState::Stopping => write!(f, "stopping"),
            InstanceState::Pending => write!(f, "pending"),
            InstanceState::Running => write!(f, "running"),
        }
    }
}

/// Lifecycle of a tunnel supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelState {
    /// Not started yet
    Idle,
    /// Creating a broker session and launching the companion
    Starting,
    /// Companion reported it is accepting connections
    Ready,
    /// Companion exited unexpectedly and is being relaunched
    Restarting,
    /// Terminal state
    Stopped,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Idle => write!(f, "idle"),
            TunnelState::Starting => write!(f, "starting"),
            TunnelState::Ready => write!(f, "ready"),
            TunnelState::Restarting => write!(f, "restarting"),
            TunnelState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_remote_port_follows_connection_type() {
        let types = ConnectionTypes::default();
        let target = Target::new("box", "i-0123", "us-west-1", "RDP", &types).unwrap();
        assert_eq!(target.connection_type(), "rdp");
        assert_eq!(target.remote_port(), 3389);
    }

    #[test]
    fn test_unknown_connection_type() {
        let types = ConnectionTypes::default();
        let err = Target::new("box", "i-0123", "us-west-1", "telnet", &types).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConnectionType(t) if t == "telnet"));
    }

    #[test]
    fn test_with_type_does_not_mutate_original() {
        let base = ConnectionTypes::default();
        let extended = base.with_type("http", 8080);
        assert_eq!(extended.remote_port("http"), Some(8080));
        assert_eq!(base.remote_port("http"), None);
        assert_eq!(extended.remote_port("ssh"), Some(22));
    }

    #[test]
    fn test_local_ports_stay_in_range() {
        let types = ConnectionTypes::default();
        for _ in 0..2000 {
            let target = Target::new("box", "i-0123", "us-west-1", "ssh", &types).unwrap();
            assert!(LOCAL_PORT_RANGE.contains(&target.local_port()));
        }
    }

    #[test]
    fn test_local_port_override() {
        let types = ConnectionTypes::default();
        let target = Target::new("box", "i-0123", "us-west-1", "vnc", &types)
            .unwrap()
            .with_local_port(55555);
        assert_eq!(target.local_port(), 55555);
        assert_eq!(target.remote_port(), 5900);
    }

    #[test]
    fn test_full_username() {
        let types = ConnectionTypes::default();
        let target = Target::new("box", "i-0123", "us-west-1", "rdp", &types)
            .unwrap()
            .with_domain(Some("corp".into()))
            .with_username(Some("alice".into()));
        assert_eq!(target.full_username().as_deref(), Some("corp\\alice"));

        let bare = target.clone().with_domain(Some(String::new()));
        assert_eq!(bare.full_username().as_deref(), Some("alice"));
    }

    #[test]
    fn test_instance_state_from_remote() {
        assert_eq!(InstanceState::from_remote("running"), InstanceState::Running);
        assert_eq!(InstanceState::from_remote("stopped"), InstanceState::Stopped);
        assert_eq!(InstanceState::from_remote("terminated"), InstanceState::Unknown);
    }

    #[test]
    fn test_broker_session_json_shape() {
        let session = BrokerSession {
            session_id: "s-1".into(),
            token_value: Some("tok".into()),
            stream_url: Some("wss://x".into()),
        };
        let json = serde_json::to_string(&session).unwrap();
        assert_eq!(
            json,
            r#"{"SessionId":"s-1","TokenValue":"tok","StreamUrl":"wss://x"}"#
        );
    }

    #[test]
    fn test_credential_expires_within() {
        let now = SystemTime::now();
        let cred = Credential {
            access_key: "AK".into(),
            secret_key: "SK".into(),
            session_token: None,
            expiry: now + Duration::from_secs(30),
        };
        assert!(cred.expires_within(now, Duration::from_secs(60)));
        assert!(!cred.expires_within(now, Duration::from_secs(10)));
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let cred = Credential {
            access_key: "AK".into(),
            secret_key: "very-secret".into(),
            session_token: Some("token".into()),
            expiry: SystemTime::now(),
        };
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("\"token\""));
    }
}
