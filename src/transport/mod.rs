//! Delivery of packets to the remote error-tracking service.
//!
//! The hook only depends on the [`Transport`] trait; [`HttpTransport`] is the
//! default implementation speaking the Sentry store protocol.

pub mod dsn;
pub mod client;
pub mod serialization;

use crate::packet::Packet;
use std::sync::Arc;
use thiserror::Error;

pub use dsn::Dsn;
pub use client::{HttpTransport, TransportConfig};
pub use serialization::{
    COMPRESSED_CONTENT_TYPE, EncodedPayload, JSON_CONTENT_TYPE, decode_payload, encode_packet,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("got http status {status}")]
    HttpStatus { status: u16 },
    #[error("Transport is closed")]
    Closed,
}

pub type DeliveryResult = Result<(), TransportError>;

/// Invoked exactly once with the outcome of one packet delivery.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    fn send(&self, packet: Packet, on_complete: DeliveryCallback);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, packet: Packet, on_complete: DeliveryCallback) {
        (**self).send(packet, on_complete);
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, packet: Packet, on_complete: DeliveryCallback) {
        (**self).send(packet, on_complete);
    }
}
