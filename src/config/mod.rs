pub mod serde_helpers;
mod validation;

use crate::domain::LogLevel;
use crate::stacktrace::StacktraceConfig;
use crate::transport::{TransportConfig, TransportError};
use serde::{Deserialize, Serialize};
use serde_helpers::{env_parse, env_string};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Hook settings, loadable from TOML and overridable from `SENTRY_*`
/// environment variables.
///
/// ```toml
/// dsn = "https://public@sentry.example.com/42"
/// levels = ["panic", "fatal", "error"]
///
/// [tags]
/// site = "web"
///
/// [stacktrace]
/// enable = true
/// level = "error"
///
/// [transport]
/// timeout_ms = 30000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub dsn: String,
    pub levels: Vec<LogLevel>,
    pub tags: BTreeMap<String, String>,
    pub server_name: Option<String>,
    pub logger: Option<String>,
    pub release: Option<String>,
    pub environment: Option<String>,
    /// Upper bound on a synchronous `fire`; unset waits for the transport.
    #[serde(
        rename = "timeout_ms",
        with = "serde_helpers::opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    pub asynchronous: bool,
    pub ignore_fields: Vec<String>,
    pub stacktrace: StacktraceConfig,
    pub transport: TransportConfig,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            levels: vec![LogLevel::Panic, LogLevel::Fatal, LogLevel::Error],
            tags: BTreeMap::new(),
            server_name: None,
            logger: None,
            release: None,
            environment: None,
            timeout: None,
            asynchronous: false,
            ignore_fields: Vec::new(),
            stacktrace: StacktraceConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl HookConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reads `path` when given, applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `SENTRY_DSN`, `SENTRY_RELEASE`,
    /// `SENTRY_ENVIRONMENT`, `SENTRY_SERVER_NAME` and `SENTRY_TIMEOUT_MS`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(dsn) = env_string("SENTRY_DSN") {
            self.dsn = dsn;
        }
        for (name, target) in [
            ("SENTRY_RELEASE", &mut self.release),
            ("SENTRY_ENVIRONMENT", &mut self.environment),
            ("SENTRY_SERVER_NAME", &mut self.server_name),
        ] {
            if let Some(value) = env_string(name) {
                *target = Some(value);
            }
        }
        if let Some(ms) = env_parse::<u64>("SENTRY_TIMEOUT_MS")? {
            self.timeout = Some(Duration::from_millis(ms));
        }
        Ok(())
    }
}
