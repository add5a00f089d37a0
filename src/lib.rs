#![warn(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Durations in milliseconds fit in u64
    clippy::missing_errors_doc,       // Error enums document themselves
    clippy::module_name_repetitions,  // e.g. HookError in hook module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Sentry field names in docs
)]

//! Log hook that turns structured log entries into Sentry error-report packets.
//!
//! The pipeline is `LogEntry` → [`classify`] → [`assemble`] → [`hook`] →
//! [`transport`]. [`layer::SentryLayer`] connects the hook to `tracing`.

pub mod assemble;
pub mod classify;
pub mod config;
pub mod domain;
pub mod hook;
pub mod layer;
pub mod normalize;
pub mod packet;
pub mod stacktrace;
pub mod transport;

// Re-export main types for easy access
pub use config::HookConfig;
pub use domain::{FieldValue, HookError, LogEntry, LogLevel};
pub use hook::SentryHook;
pub use layer::SentryLayer;
pub use packet::Packet;
pub use transport::{Dsn, HttpTransport, Transport, TransportError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
