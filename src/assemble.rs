//! Packet assembly from an entry and its classified fields.

use crate::classify::Classified;
use crate::domain::LogEntry;
use crate::packet::{DEFAULT_LOGGER, PLATFORM, Packet, Tag, Tags};
use crate::stacktrace::StacktraceExtractor;
use std::error::Error;
use tracing::debug;
use uuid::Uuid;

/// Hook-level values used when an entry does not supply its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblerDefaults {
    pub server_name: Option<String>,
    pub logger: Option<String>,
    pub release: Option<String>,
    pub environment: Option<String>,
    pub tags: Tags,
}

impl AssemblerDefaults {
    /// Defaults with `server_name` set to the process hostname.
    pub fn from_host() -> Self {
        Self {
            server_name: hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PacketAssembler {
    defaults: AssemblerDefaults,
    extractor: StacktraceExtractor,
}

impl PacketAssembler {
    pub fn new(defaults: AssemblerDefaults, extractor: StacktraceExtractor) -> Self {
        Self {
            defaults,
            extractor,
        }
    }

    pub fn defaults(&self) -> &AssemblerDefaults {
        &self.defaults
    }

    pub fn defaults_mut(&mut self) -> &mut AssemblerDefaults {
        &mut self.defaults
    }

    pub fn extractor(&self) -> &StacktraceExtractor {
        &self.extractor
    }

    pub fn assemble(&self, entry: &LogEntry, classified: Classified) -> Packet {
        let Classified { special, extra } = classified;

        let mut packet = Packet {
            event_id: special
                .event_id
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            message: entry.message.clone(),
            timestamp: entry.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            level: entry.level.sentry_severity().to_string(),
            logger: special
                .logger
                .or_else(|| self.defaults.logger.clone())
                .unwrap_or_else(|| DEFAULT_LOGGER.to_string()),
            platform: PLATFORM.to_string(),
            server_name: special
                .server_name
                .or_else(|| self.defaults.server_name.clone())
                .unwrap_or_default(),
            release: self.defaults.release.clone(),
            environment: self.defaults.environment.clone(),
            tags: merge_tags(&self.defaults.tags, special.tags.unwrap_or_default()),
            fingerprint: special.fingerprint.unwrap_or_default(),
            extra: extra.into_iter().map(|(k, v)| (k, v.to_json())).collect(),
            request: special.request,
            user: special.user,
            ..Default::default()
        };

        let config = self.extractor.config();
        let traced_level = config.enable && entry.level >= config.level;

        match entry.error.as_deref() {
            Some(err) => {
                let err: &(dyn Error + 'static) = err;
                packet.culprit = err.to_string();
                packet.stacktrace = self.extractor.extract(err);
                if traced_level {
                    packet.exception =
                        Some(self.extractor.exception(err, packet.stacktrace.clone()));
                }
            }
            None if traced_level => {
                packet.stacktrace = Some(self.extractor.capture_current());
            }
            None => {}
        }

        debug!(
            "Assembled packet {} ({} extra fields, stacktrace: {})",
            packet.event_id,
            packet.extra.len(),
            packet.stacktrace.is_some()
        );
        packet
    }
}

/// Static tags merged with per-entry tags; per-entry tags win on key collision.
pub fn merge_tags(static_tags: &[Tag], entry_tags: Tags) -> Tags {
    let mut merged: Tags = static_tags
        .iter()
        .filter(|t| !entry_tags.iter().any(|e| e.key == t.key))
        .cloned()
        .collect();
    merged.extend(entry_tags);
    merged
}
