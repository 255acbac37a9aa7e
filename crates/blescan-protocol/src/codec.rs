//! Encoding of the stored-device list on the wire.
//!
//! The list travels as base64 of its compact JSON text, so it fits in a
//! single space-free token. Object key order is preserved, which makes a
//! store/read round trip byte-identical for compact input.

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while decoding a stored-device blob.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid payload: bad base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid payload: bad JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a value as base64(JSON).
pub fn encode_stored_devices(value: &Value) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Decode a base64(JSON) blob.
pub fn decode_stored_devices(blob: &str) -> Result<Value, CodecError> {
    let json = general_purpose::STANDARD.decode(blob.trim())?;
    Ok(serde_json::from_slice(&json)?)
}
