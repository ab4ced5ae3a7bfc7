//! Cairn File Registry
//!
//! Content-addressed file registry: every distinct content is registered once,
//! globally, to the first identity that uploads it. Each identity keeps its own
//! catalog of named files, can search the registry by perceptual fingerprint,
//! and receives notifications in an append-only alert outbox.

pub mod catalog;
pub mod errors;
pub mod hash;
pub mod outbox;
pub mod record;
pub mod registry;
pub mod service;
pub mod similarity;
pub mod storage;

pub use catalog::{Catalog, OwnerCatalogs};
pub use errors::*;
pub use hash::{ContentHash, ContentHashError};
pub use outbox::AlertOutbox;
pub use record::{
    FileRecord, FileSummary, Identity, Verification, MAX_IDENTITY_LEN, MAX_MEDIA_TYPE_LEN,
    MAX_NAME_LEN,
};
pub use registry::GlobalRegistry;
pub use service::{
    FileRegistry, RegistryConfig, RetentionPolicy, UploadOutcome, UploadRequest,
    DEFAULT_MAX_FILE_SIZE_BYTES, DUMMY_NOTIFICATION,
};
pub use similarity::{
    find_similar, similarity_percent, Fingerprint, FingerprintError, SimilarMatch,
    DEFAULT_SIMILARITY_THRESHOLD, FINGERPRINT_BITS,
};
pub use storage::{MemoryRegistryStore, RegistryStore};

#[cfg(test)]
mod tests;
