//! Core error types for Summoner

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the Summoner crates
#[derive(Error, Debug)]
pub enum SummonerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote API error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Tunnel error
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
///
/// These are fatal and surface at startup (or at the first tunnel start for
/// a missing companion binary); they are never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Credential profile could not be resolved locally
    #[error("Could not find '{profile}' profile in AWS config: {reason}")]
    ProfileNotFound { profile: String, reason: String },

    /// Companion plugin executable is not available
    #[error("'{0}' was not found on PATH; install the Session Manager plugin")]
    PluginNotFound(String),

    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Connection type missing from the connection-type table
    #[error("Unknown connection type '{0}'")]
    UnknownConnectionType(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Classified remote failure.
///
/// Errors of these kinds are logged and end the current attempt without
/// terminating the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The instance or session does not exist
    NotFound,
    /// Caller lacks permission
    PermissionDenied,
    /// The instance cannot change state right now
    InvalidState,
    /// The broker could not reach the target or failed internally
    ServiceUnavailable,
}

const NOT_FOUND_MARKERS: &[&str] = &["ResourceNotFoundException", "InvalidInstanceID"];
const PERMISSION_MARKERS: &[&str] = &["AccessDenied", "UnauthorizedOperation", "403"];
const STATE_MARKERS: &[&str] = &["IncorrectInstanceState"];
const SERVICE_MARKERS: &[&str] = &["TargetNotConnected", "InternalServerError"];

impl ApiErrorKind {
    /// Classify a remote error message by its content.
    ///
    /// Returns `None` when no known marker matches; such errors are
    /// unclassified and must be propagated as hard failures.
    pub fn classify(message: &str) -> Option<Self> {
        let matches = |markers: &[&str]| markers.iter().any(|m| message.contains(m));

        if matches(NOT_FOUND_MARKERS) {
            Some(Self::NotFound)
        } else if matches(PERMISSION_MARKERS) {
            Some(Self::PermissionDenied)
        } else if matches(STATE_MARKERS) {
            Some(Self::InvalidState)
        } else if matches(SERVICE_MARKERS) {
            Some(Self::ServiceUnavailable)
        } else {
            None
        }
    }

    /// Short operator-facing description
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NotFound => "Instance could not be found",
            Self::PermissionDenied => "You do not have permission to interact with that instance",
            Self::InvalidState => {
                "Instance state could not be changed, please try again in a few minutes"
            }
            Self::ServiceUnavailable => "Could not start session",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::ServiceUnavailable => write!(f, "service unavailable"),
        }
    }
}

/// Errors returned by the remote service boundary
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Known, non-fatal remote failure
    #[error("{operation} failed ({kind}): {message}")]
    Api {
        kind: ApiErrorKind,
        operation: &'static str,
        message: String,
    },

    /// Anything the classifier does not recognise
    #[error(transparent)]
    Unclassified(#[from] UnclassifiedError),
}

impl RemoteError {
    /// Build a remote error from a message, classifying it by content.
    pub fn from_message<E>(operation: &'static str, message: String, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match ApiErrorKind::classify(&message) {
            Some(kind) => Self::Api {
                kind,
                operation,
                message,
            },
            None => Self::Unclassified(UnclassifiedError {
                operation,
                source: source.into(),
            }),
        }
    }

    /// The classified kind, if any
    pub fn kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Api { kind, .. } => Some(*kind),
            Self::Unclassified(_) => None,
        }
    }
}

/// Unclassified remote failure, wrapping the original cause
#[derive(Error, Debug)]
#[error("Unhandled remote error in {operation}: {source}")]
pub struct UnclassifiedError {
    pub operation: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Tunnel supervisor errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// `start()` was called on a supervisor that is already running
    #[error("Tunnel supervisor already started")]
    AlreadyStarted,

    /// Companion process could not be spawned
    #[error("Failed to spawn companion process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Companion arguments could not be encoded
    #[error("Failed to encode companion arguments: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration problem detected when starting
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_markers() {
        assert_eq!(
            ApiErrorKind::classify("InvalidInstanceID.NotFound: i-123"),
            Some(ApiErrorKind::NotFound)
        );
        assert_eq!(
            ApiErrorKind::classify("UnauthorizedOperation: not allowed"),
            Some(ApiErrorKind::PermissionDenied)
        );
        assert_eq!(
            ApiErrorKind::classify("IncorrectInstanceState: stopping"),
            Some(ApiErrorKind::InvalidState)
        );
        assert_eq!(
            ApiErrorKind::classify("TargetNotConnected: i-123 is not connected"),
            Some(ApiErrorKind::ServiceUnavailable)
        );
    }

    #[test]
    fn test_classify_unknown_message() {
        assert_eq!(ApiErrorKind::classify("ThrottlingException"), None);
    }

    #[test]
    fn test_not_found_wins_over_later_markers() {
        // Markers are checked in order, so a message mentioning both resolves
        // to the first group.
        assert_eq!(
            ApiErrorKind::classify("ResourceNotFoundException (403)"),
            Some(ApiErrorKind::NotFound)
        );
    }

    #[test]
    fn test_from_message_wraps_unclassified() {
        let err = RemoteError::from_message(
            "start_instance",
            "ThrottlingException: slow down".to_string(),
            "ThrottlingException: slow down",
        );
        assert!(err.kind().is_none());
        assert!(err.to_string().contains("start_instance"));
    }

    #[test]
    fn test_from_message_classifies() {
        let err = RemoteError::from_message(
            "stop_instance",
            "AccessDenied".to_string(),
            "AccessDenied",
        );
        assert_eq!(err.kind(), Some(ApiErrorKind::PermissionDenied));
    }
}
