//! Serde adapters and environment readers shared by the config types.

use super::ConfigError;
use serde::{Deserialize, Deserializer, Serializer};
use std::str::FromStr;
use std::time::Duration;

/// `Duration` stored as whole milliseconds, e.g. `timeout_ms = 30000`.
pub mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Optional `Duration` in milliseconds; an absent key means no bound.
pub mod opt_millis {
    use super::*;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

/// Value of `SENTRY_*` variable `name`, if set.
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Parsed value of `name`, e.g. `SENTRY_TIMEOUT_MS`; unset yields `None`.
pub fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(name)
        .map(|raw| {
            raw.parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid {name} '{raw}': {e}")))
        })
        .transpose()
}
