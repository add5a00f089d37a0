use crate::config::ConfigError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for hook construction and `fire`.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No response from sentry server in {0:?}")]
    Timeout(Duration),
}

impl HookError {
    /// HTTP status reported by the remote service, if that caused the failure.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            HookError::Transport(TransportError::HttpStatus { status }) => Some(*status),
            _ => None,
        }
    }
}
