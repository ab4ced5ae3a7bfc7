//! Content hashing for the global registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a rendered content hash.
pub const CONTENT_HASH_HEX_LEN: usize = 64;

/// Errors emitted when decoding a content hash from its hex form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentHashError {
    #[error("content hash must be 64 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("content hash must be valid hex: {0}")]
    InvalidHex(String),
}

/// BLAKE3-256 digest of file content.
///
/// Used as the lookup key of the global registry, so the rendered form is fixed:
/// 64 lowercase hex characters without separators.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash the given data using BLAKE3.
    pub fn from_data(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as lowercase hexadecimal.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string. Upper-case digits and a `0x` prefix are accepted.
    pub fn from_hex(value: &str) -> Result<Self, ContentHashError> {
        let normalized = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);

        if normalized.len() != CONTENT_HASH_HEX_LEN {
            return Err(ContentHashError::InvalidLength(normalized.len()));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(normalized, &mut bytes)
            .map_err(|err| ContentHashError::InvalidHex(err.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ContentHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}
