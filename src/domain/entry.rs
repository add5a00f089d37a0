use super::log_level::LogLevel;
use super::value::FieldValue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

/// Error attached to an entry, shared so the entry stays cheap to clone.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// One structured log record, consumed by a single `fire` call.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub error: Option<SharedError>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            fields: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_error<E>(self, err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.with_shared_error(Arc::new(err))
    }

    pub fn with_shared_error(mut self, err: SharedError) -> Self {
        self.error = Some(err);
        self
    }

    pub fn with_anyhow(self, err: anyhow::Error) -> Self {
        let boxed: Box<dyn Error + Send + Sync + 'static> = err.into();
        self.with_shared_error(Arc::from(boxed))
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}
