//! Error types for the file registry

use crate::hash::ContentHashError;
use crate::similarity::FingerprintError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid identity: {reason}")]
    InvalidIdentity { reason: String },

    #[error("File name must not be empty")]
    EmptyName,

    #[error("File name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("File name must not contain control characters")]
    InvalidName,

    #[error("File content must not be empty")]
    EmptyContent,

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Media type too long: {len} bytes (max {max})")]
    MediaTypeTooLong { len: usize, max: usize },

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(#[from] FingerprintError),

    #[error("Invalid content hash: {0}")]
    InvalidContentHash(#[from] ContentHashError),

    #[error("Similarity threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(u32),

    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    #[error("Registry storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RegistryError {
    /// True for conditions caused by the caller's input rather than the registry.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(
            self,
            RegistryError::Storage(_) | RegistryError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
