use super::TransportError;
use crate::packet::Packet;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const COMPRESSED_CONTENT_TYPE: &str = "application/octet-stream";

/// Bodies above this many bytes are compressed by default.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub compressed: bool,
}

/// Encodes a packet as JSON, or as base64 of zlib-deflated JSON when the JSON
/// is larger than `compress_threshold` bytes.
pub fn encode_packet(
    packet: &Packet,
    compress_threshold: usize,
) -> Result<EncodedPayload, TransportError> {
    let json = serde_json::to_vec(packet)
        .map_err(|e| TransportError::Serialization(e.to_string()))?;

    if json.len() <= compress_threshold {
        return Ok(EncodedPayload {
            body: json,
            content_type: JSON_CONTENT_TYPE,
            compressed: false,
        });
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| TransportError::Serialization(e.to_string()))?;
    let deflated = encoder
        .finish()
        .map_err(|e| TransportError::Serialization(e.to_string()))?;

    Ok(EncodedPayload {
        body: STANDARD.encode(deflated).into_bytes(),
        content_type: COMPRESSED_CONTENT_TYPE,
        compressed: true,
    })
}

/// Inverse of [`encode_packet`], keyed on the content type.
pub fn decode_payload(body: &[u8], content_type: &str) -> Result<Packet, TransportError> {
    let json = if content_type == COMPRESSED_CONTENT_TYPE {
        let deflated = STANDARD
            .decode(body)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        let mut json = Vec::new();
        ZlibDecoder::new(deflated.as_slice())
            .read_to_end(&mut json)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        json
    } else {
        body.to_vec()
    };

    serde_json::from_slice(&json).map_err(|e| TransportError::Serialization(e.to_string()))
}
