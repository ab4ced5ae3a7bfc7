//! Perceptual fingerprints and Hamming-distance similarity search.
//!
//! Fingerprints are supplied by the uploader and are never derived from the
//! stored content, so a match only says that two callers *claimed* similar
//! fingerprints.

use crate::hash::ContentHash;
use crate::record::{FileRecord, Identity};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Width of a fingerprint in bits.
pub const FINGERPRINT_BITS: u32 = 64;

/// Minimum similarity percentage for a record to be reported as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 90;

const MAX_FINGERPRINT_HEX_DIGITS: usize = (FINGERPRINT_BITS / 4) as usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("fingerprint must not be empty")]
    Empty,
    #[error("fingerprint is wider than 64 bits ({0} hex digits)")]
    TooWide(usize),
    #[error("fingerprint must be hexadecimal: {0}")]
    InvalidHex(String),
}

/// 64-bit perceptual hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse 1 to 16 hex digits, optionally prefixed with `0x`.
    /// Narrower values are zero-extended to 64 bits.
    pub fn from_hex(value: &str) -> Result<Self, FingerprintError> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);

        if digits.is_empty() {
            return Err(FingerprintError::Empty);
        }
        if digits.len() > MAX_FINGERPRINT_HEX_DIGITS {
            return Err(FingerprintError::TooWide(digits.len()));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FingerprintError::InvalidHex(value.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|err| FingerprintError::InvalidHex(err.to_string()))
    }

    /// Render as 16 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Number of differing bits.
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity percentage in `0..=100`, rounded down.
    pub fn similarity(&self, other: &Fingerprint) -> u8 {
        similarity_percent(self.hamming_distance(other))
    }
}

/// `(bits - distance) * 100 / bits` with integer (floor) division.
pub fn similarity_percent(distance: u32) -> u8 {
    let distance = distance.min(FINGERPRINT_BITS);
    ((FINGERPRINT_BITS - distance) * 100 / FINGERPRINT_BITS) as u8
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<u64> for Fingerprint {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// A registry record whose fingerprint is close enough to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub name: String,
    pub content_hash: ContentHash,
    pub fingerprint: Fingerprint,
    pub owner: Identity,
    pub similarity: u8,
}

/// Linear scan: every record with `similarity >= threshold` is returned,
/// most similar first, ties ordered by content hash.
pub fn find_similar<'a, I>(records: I, query: Fingerprint, threshold: u8) -> Vec<SimilarMatch>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let mut matches: Vec<SimilarMatch> = records
        .into_iter()
        .filter_map(|record| {
            let similarity = query.similarity(&record.fingerprint());
            (similarity >= threshold).then(|| SimilarMatch {
                name: record.name().to_string(),
                content_hash: *record.content_hash(),
                fingerprint: record.fingerprint(),
                owner: record.owner().clone(),
                similarity,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .cmp(&a.similarity)
            .then_with(|| a.content_hash.cmp(&b.content_hash))
    });
    matches
}
