use super::{ConfigError, HookConfig};
use crate::transport::Dsn;

impl HookConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dsn.is_empty() {
            return Err(ConfigError::InvalidDsn("DSN must be set".to_string()));
        }
        Dsn::parse(&self.dsn)
            .map_err(|e| ConfigError::InvalidDsn(format!("'{}': {}", self.dsn, e)))?;

        if self.levels.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "At least one level must be enabled".to_string(),
            ));
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidConfig(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.transport.timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Transport timeout must be greater than 0".to_string(),
            ));
        }

        if self.tags.keys().any(|key| key.is_empty()) {
            return Err(ConfigError::InvalidConfig(
                "Tag keys must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
