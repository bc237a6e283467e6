//! At-rest encoding for stored credential entries
//!
//! Values are serialized to JSON and base64 encoded. This is obfuscation, not
//! encryption; the format is private to this crate.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors from encoding or decoding a stored entry
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized or the decoded bytes were not valid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Stored text was not valid base64
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode a value for storage
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(STANDARD.encode(json))
}

/// Decode a stored value
pub fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T, CodecError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}
