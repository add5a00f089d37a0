//! Domain layer for rask-sentry-hook.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEntry`: one structured log record handed to the hook
//! - `FieldValue`: the closed set of value shapes a field may carry
//! - `LogLevel`: log severity, ordered from Trace to Panic
//! - `HookError`: top-level error type

pub mod entry;
pub mod error;
pub mod log_level;
pub mod value;

pub use entry::{LogEntry, SharedError};
pub use error::HookError;
pub use log_level::LogLevel;
pub use value::FieldValue;
