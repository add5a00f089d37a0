//! `tracing` integration: forwards events at the hook's levels to Sentry.

use crate::domain::{FieldValue, LogEntry, LogLevel};
use crate::hook::SentryHook;
use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber, debug};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");
const MESSAGE_FIELD: &str = "message";
const ERROR_FIELD: &str = "error";

thread_local! {
    static FIRING: Cell<bool> = const { Cell::new(false) };
}

/// Layer that builds a [`LogEntry`] from each event and fires it through a
/// shared [`SentryHook`].
///
/// A field named `error` recorded as `&dyn Error` becomes the entry's
/// attached error. Events emitted while the hook itself is running on the
/// same thread are skipped.
#[derive(Debug, Clone)]
pub struct SentryLayer {
    hook: Arc<SentryHook>,
}

impl SentryLayer {
    pub fn new(hook: Arc<SentryHook>) -> Self {
        Self { hook }
    }

    pub fn hook(&self) -> &Arc<SentryHook> {
        &self.hook
    }
}

impl<S: Subscriber> Layer<S> for SentryLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET) {
            return;
        }
        let level = LogLevel::from(metadata.level());
        if !self.hook.is_enabled(level) {
            return;
        }
        let Some(_guard) = FiringGuard::enter() else {
            return;
        };

        let mut visitor = EntryVisitor {
            entry: LogEntry::new(level, String::new()),
        };
        event.record(&mut visitor);

        if let Err(e) = self.hook.fire(&visitor.entry) {
            debug!("Sentry hook failed for event from {}: {}", metadata.target(), e);
        }
    }
}

/// Marks the current thread as inside `fire` until dropped, including when
/// an error handler panics.
struct FiringGuard;

impl FiringGuard {
    fn enter() -> Option<Self> {
        FIRING.with(|firing| (!firing.replace(true)).then_some(FiringGuard))
    }
}

impl Drop for FiringGuard {
    fn drop(&mut self) {
        FIRING.with(|firing| firing.set(false));
    }
}

struct EntryVisitor {
    entry: LogEntry,
}

impl EntryVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.entry.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for EntryVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == MESSAGE_FIELD {
            self.entry.message = rendered;
        } else {
            self.insert(field, FieldValue::String(rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.entry.message = value.to_string();
        } else {
            self.insert(field, FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        let captured = Arc::new(CapturedError::capture(value));
        if field.name() == ERROR_FIELD && self.entry.error.is_none() {
            self.entry.error = Some(captured);
        } else {
            self.insert(field, FieldValue::Error(captured));
        }
    }
}

/// Owned copy of a borrowed error and its `source()` chain.
#[derive(Debug)]
pub struct CapturedError {
    message: String,
    source: Option<Box<CapturedError>>,
}

impl CapturedError {
    pub fn capture(err: &(dyn Error + 'static)) -> Self {
        Self {
            message: err.to_string(),
            source: err.source().map(|source| Box::new(Self::capture(source))),
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for CapturedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|source| source as &(dyn Error + 'static))
    }
}
