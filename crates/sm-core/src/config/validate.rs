//! Field validators for account files and command-line input

use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::LOCAL_PORT_RANGE;

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2}-(gov-)?[a-z]+-\d$").expect("valid regex"))
}

fn instance_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(mi|i)-([a-f0-9]{8}|[a-f0-9]{17})$").expect("valid regex")
    })
}

fn role_arn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^arn:aws(-[a-z]+)?:iam::\d{12}:role/.+$").expect("valid regex")
    })
}

/// Region name such as `us-west-1` or `us-gov-east-1`
pub fn region(value: &str) -> Result<(), ConfigError> {
    if region_pattern().is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("invalid region '{}'", value)))
    }
}

/// Instance id such as `i-01234567890abcdef`
pub fn instance_id(value: &str) -> Result<(), ConfigError> {
    if instance_id_pattern().is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("invalid instance id '{}'", value)))
    }
}

/// IAM role ARN
pub fn role_arn(value: &str) -> Result<(), ConfigError> {
    if role_arn_pattern().is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("invalid role ARN '{}'", value)))
    }
}

/// Session durations STS accepts for AssumeRole, in seconds
pub const ASSUME_ROLE_TTL_SECS: RangeInclusive<u64> = 900..=43200;

/// Credential lifetime.
///
/// Role assumption is bound by the STS limits; profile credentials only get
/// a synthetic expiry, which just has to be non-zero.
pub fn session_ttl(ttl: Duration, assumes_role: bool) -> Result<(), ConfigError> {
    if assumes_role && !ASSUME_ROLE_TTL_SECS.contains(&ttl.as_secs()) {
        return Err(ConfigError::Invalid(format!(
            "session_ttl must be between {} and {} seconds when assuming a role, got {}",
            ASSUME_ROLE_TTL_SECS.start(),
            ASSUME_ROLE_TTL_SECS.end(),
            ttl.as_secs()
        )));
    }
    if ttl.is_zero() {
        return Err(ConfigError::Invalid("session_ttl must not be zero".to_string()));
    }
    Ok(())
}

/// Local forwarding port
pub fn local_port(port: u16) -> Result<(), ConfigError> {
    if LOCAL_PORT_RANGE.contains(&port) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "local port {} must be between {} and {}",
            port,
            LOCAL_PORT_RANGE.start,
            LOCAL_PORT_RANGE.end - 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions() {
        assert!(region("us-west-1").is_ok());
        assert!(region("us-gov-west-1").is_ok());
        assert!(region("US-WEST-1").is_err());
        assert!(region("us-west").is_err());
    }

    #[test]
    fn test_instance_ids() {
        assert!(instance_id("i-01234567890abcdef").is_ok());
        assert!(instance_id("i-0123abcd").is_ok());
        assert!(instance_id("i-0123").is_err());
        assert!(instance_id("01234567890abcdef").is_err());
    }

    #[test]
    fn test_role_arns() {
        assert!(role_arn("arn:aws:iam::123456789012:role/Admin").is_ok());
        assert!(role_arn("arn:aws-us-gov:iam::123456789012:role/Admin").is_ok());
        assert!(role_arn("arn:aws:iam::1234:role/Admin").is_err());
    }

    #[test]
    fn test_session_ttl_with_role() {
        assert!(session_ttl(Duration::from_secs(900), true).is_ok());
        assert!(session_ttl(Duration::from_secs(43200), true).is_ok());
        assert!(session_ttl(Duration::from_secs(899), true).is_err());
        assert!(session_ttl(Duration::from_secs(43201), true).is_err());
    }

    #[test]
    fn test_session_ttl_without_role() {
        assert!(session_ttl(Duration::from_secs(60), false).is_ok());
        assert!(session_ttl(Duration::from_secs(86400), false).is_ok());
        assert!(session_ttl(Duration::ZERO, false).is_err());
    }

    #[test]
    fn test_local_port_bounds() {
        assert!(local_port(50000).is_ok());
        assert!(local_port(59999).is_ok());
        assert!(local_port(60000).is_err());
        assert!(local_port(22).is_err());
    }
}
