//! File record data model.

use crate::errors::{RegistryError, Result};
use crate::hash::ContentHash;
use crate::similarity::Fingerprint;
use cairn_time::CairnTimeMicros;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a file name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of a media type in bytes.
pub const MAX_MEDIA_TYPE_LEN: usize = 128;

/// Maximum length of an identity token in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;

/// Opaque caller identity supplied by the identity provider.
///
/// The registry only compares identities; it never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(RegistryError::InvalidIdentity {
                reason: "identity must not be empty".to_string(),
            });
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(RegistryError::InvalidIdentity {
                reason: format!("identity longer than {MAX_IDENTITY_LEN} bytes"),
            });
        }
        if raw.chars().any(char::is_control) {
            return Err(RegistryError::InvalidIdentity {
                reason: "identity must not contain control characters".to_string(),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored file version.
///
/// Fields are private so a record cannot change after creation; `size` is
/// always derived from the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    name: String,
    content: Vec<u8>,
    media_type: String,
    content_hash: ContentHash,
    fingerprint: Fingerprint,
    created_at_us: u64,
    owner: Identity,
}

impl FileRecord {
    /// Create a record stamped with the current Cairn time.
    pub fn new(
        owner: Identity,
        name: String,
        content: Vec<u8>,
        media_type: String,
        fingerprint: Fingerprint,
    ) -> Self {
        Self::new_at_time(
            owner,
            name,
            content,
            media_type,
            fingerprint,
            CairnTimeMicros::now(),
        )
    }

    /// Create a record with explicit timestamp (for testing/reconstruction).
    pub fn new_at_time(
        owner: Identity,
        name: String,
        content: Vec<u8>,
        media_type: String,
        fingerprint: Fingerprint,
        time: CairnTimeMicros,
    ) -> Self {
        let content_hash = ContentHash::from_data(&content);
        Self::with_hash(owner, name, content, content_hash, media_type, fingerprint, time)
    }

    /// Build from an already computed hash. Callers must pass `hash(content)`.
    pub(crate) fn with_hash(
        owner: Identity,
        name: String,
        content: Vec<u8>,
        content_hash: ContentHash,
        media_type: String,
        fingerprint: Fingerprint,
        time: CairnTimeMicros,
    ) -> Self {
        debug_assert_eq!(content_hash, ContentHash::from_data(&content));
        Self {
            name,
            content,
            media_type,
            content_hash,
            fingerprint,
            created_at_us: time.as_micros(),
            owner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn created_at_us(&self) -> u64 {
        self.created_at_us
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    /// Catalog listing view.
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            name: self.name.clone(),
            size: self.size(),
            media_type: self.media_type.clone(),
            content_hash: self.content_hash,
            fingerprint: self.fingerprint,
            created_at_us: self.created_at_us,
        }
    }

    /// Proof of registration. Deliberately omits the content.
    pub fn verification(&self) -> Verification {
        Verification {
            name: self.name.clone(),
            media_type: self.media_type.clone(),
            created_at_us: self.created_at_us,
            owner: self.owner.clone(),
            fingerprint: self.fingerprint,
        }
    }
}

/// Catalog entry as reported by `get_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub media_type: String,
    pub content_hash: ContentHash,
    pub fingerprint: Fingerprint,
    pub created_at_us: u64,
}

/// Registration details returned by hash verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub name: String,
    pub media_type: String,
    pub created_at_us: u64,
    pub owner: Identity,
    pub fingerprint: Fingerprint,
}

/// Validate a file name: non-empty, bounded, no control characters.
/// Names are otherwise taken verbatim (case-sensitive, untrimmed).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RegistryError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    if name.chars().any(char::is_control) {
        return Err(RegistryError::InvalidName);
    }
    Ok(())
}

pub fn validate_media_type(media_type: &str) -> Result<()> {
    if media_type.len() > MAX_MEDIA_TYPE_LEN {
        return Err(RegistryError::MediaTypeTooLong {
            len: media_type.len(),
            max: MAX_MEDIA_TYPE_LEN,
        });
    }
    Ok(())
}
