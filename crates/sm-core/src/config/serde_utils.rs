//! Serde helpers for configuration values

/// `Duration` as a number of seconds.
///
/// Whole seconds are written as integers (`poll_interval = 15`); fractions
/// are accepted and written as floats (`poll_interval = 0.5`), which keeps
/// short test timings expressible in account files.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Timing {
///     #[serde(with = "sm_core::config::serde_utils::duration_secs")]
///     poll_interval: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid duration of {} seconds", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timing {
        #[serde(with = "duration_secs")]
        poll_interval: Duration,
    }

    #[test]
    fn test_whole_seconds_written_as_integer() {
        let timing = Timing {
            poll_interval: Duration::from_secs(15),
        };
        assert_eq!(toml::to_string(&timing).unwrap().trim(), "poll_interval = 15");
    }

    #[test]
    fn test_fractional_seconds() {
        let timing: Timing = toml::from_str("poll_interval = 0.25").unwrap();
        assert_eq!(timing.poll_interval, Duration::from_millis(250));
        assert_eq!(
            toml::to_string(&timing).unwrap().trim(),
            "poll_interval = 0.25"
        );
    }

    #[test]
    fn test_integer_seconds() {
        let timing: Timing = toml::from_str("poll_interval = 60").unwrap();
        assert_eq!(timing.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_negative_rejected() {
        let err = toml::from_str::<Timing>("poll_interval = -1").unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }
}
