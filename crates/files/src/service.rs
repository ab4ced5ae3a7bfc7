//! Registry service: the upload workflow and every caller-facing operation.
//!
//! `FileRegistry` owns the store and serializes mutations behind one write
//! gate, so the global "lookup then register" check is atomic even when the
//! node serves requests from many threads. Reads go straight to the store.

use crate::errors::{RegistryError, Result};
use crate::hash::ContentHash;
use crate::record::{
    validate_media_type, validate_name, FileRecord, FileSummary, Identity, Verification,
};
use crate::similarity::{self, Fingerprint, SimilarMatch, DEFAULT_SIMILARITY_THRESHOLD};
use crate::storage::{MemoryRegistryStore, RegistryStore};
use cairn_time::CairnTimeMicros;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default upper bound on the size of one upload (16 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: usize = 16 * 1024 * 1024;

/// Fixed message appended by `send_dummy_notification`.
pub const DUMMY_NOTIFICATION: &str = "This is a dummy notification.";

/// What happens to a global registration when its owner drops the last
/// catalog entry holding that content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Content stays claimed forever.
    #[default]
    Permanent,
    /// Release the claim so the content can be registered again.
    ReclaimOrphans,
}

impl RetentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionPolicy::Permanent => "permanent",
            RetentionPolicy::ReclaimOrphans => "reclaim-orphans",
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionPolicy {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "permanent" => Ok(RetentionPolicy::Permanent),
            "reclaim-orphans" | "reclaim_orphans" => Ok(RetentionPolicy::ReclaimOrphans),
            other => Err(RegistryError::InvalidConfig(format!(
                "unknown retention policy '{other}'"
            ))),
        }
    }
}

/// Tunables for [`FileRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub similarity_threshold: u8,
    pub retention: RetentionPolicy,
    pub max_file_size_bytes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            retention: RetentionPolicy::default(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.similarity_threshold > 100 {
            return Err(RegistryError::InvalidConfig(format!(
                "similarity threshold must be at most 100, got {}",
                self.similarity_threshold
            )));
        }
        if self.max_file_size_bytes == 0 {
            return Err(RegistryError::InvalidConfig(
                "max file size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Arguments of one upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub content: Vec<u8>,
    pub media_type: String,
    pub fingerprint: Fingerprint,
}

/// Terminal state of the upload workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The record is in the caller's catalog.
    Committed {
        summary: FileSummary,
        /// False when the caller already held the global registration.
        newly_registered: bool,
    },
    /// The content is registered to another identity. Nothing changed.
    Rejected { content_hash: ContentHash },
}

impl UploadOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, UploadOutcome::Committed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            UploadOutcome::Committed { summary, .. } => {
                format!("File '{}' uploaded successfully", summary.name)
            }
            UploadOutcome::Rejected { .. } => {
                "This file already exists in the system and is owned by another user".to_string()
            }
        }
    }
}

pub struct FileRegistry {
    store: Arc<dyn RegistryStore>,
    config: RegistryConfig,
    write_gate: Mutex<()>,
}

impl fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRegistry")
            .field("backend", &self.store.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl FileRegistry {
    pub fn new(store: Arc<dyn RegistryStore>, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let registry = Self {
            store,
            config,
            write_gate: Mutex::new(()),
        };
        registry.publish_registry_size()?;
        Ok(registry)
    }

    /// Registry over a fresh [`MemoryRegistryStore`] with default settings.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryRegistryStore::new()),
            config: RegistryConfig::default(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn check_file_exists(&self, caller: &Identity, name: &str) -> Result<bool> {
        Ok(self.store.catalog_get(caller, name)?.is_some())
    }

    /// Run the upload workflow for `caller`.
    ///
    /// Input is validated before hashing. Content registered to a different
    /// identity yields [`UploadOutcome::Rejected`], not an error.
    pub fn upload_file(&self, caller: &Identity, request: UploadRequest) -> Result<UploadOutcome> {
        let UploadRequest {
            name,
            content,
            media_type,
            fingerprint,
        } = request;

        validate_name(&name)?;
        validate_media_type(&media_type)?;
        if content.is_empty() {
            return Err(RegistryError::EmptyContent);
        }
        if content.len() > self.config.max_file_size_bytes {
            return Err(RegistryError::FileTooLarge {
                size: content.len(),
                max: self.config.max_file_size_bytes,
            });
        }

        let content_hash = ContentHash::from_data(&content);
        debug!(
            owner = %caller,
            name = %name,
            hash = %content_hash,
            fingerprint = %fingerprint,
            "Upload hashed; fingerprint is caller-supplied and not checked against content"
        );

        let _gate = self.write_gate.lock();

        let existing = self.store.lookup(&content_hash)?;
        if let Some(existing) = &existing {
            if existing.owner() != caller {
                warn!(
                    caller = %caller,
                    owner = %existing.owner(),
                    hash = %content_hash,
                    "Rejected upload of content registered to another identity"
                );
                metrics::counter!("cairn_duplicate_rejections_total").increment(1);
                return Ok(UploadOutcome::Rejected { content_hash });
            }
        }

        let record = FileRecord::with_hash(
            caller.clone(),
            name,
            content,
            content_hash,
            media_type,
            fingerprint,
            CairnTimeMicros::now(),
        );
        let summary = record.summary();

        let newly_registered = existing.is_none() && self.store.register(record.clone())?;

        let previous = self.store.catalog_put(caller, record)?;
        if let Some(previous) = previous {
            if previous.content_hash() != &content_hash {
                self.reclaim_if_orphaned(caller, previous.content_hash())?;
            }
        }

        self.store
            .append_alert(caller, &format!("Upload succeeded: {}", summary.name))?;
        self.store.append_alert(
            caller,
            &format!("View details for {} in your catalog", summary.name),
        )?;

        metrics::counter!("cairn_uploads_total").increment(1);
        self.publish_registry_size()?;
        info!(
            owner = %caller,
            name = %summary.name,
            hash = %content_hash,
            size = summary.size,
            newly_registered,
            "Committed upload"
        );

        Ok(UploadOutcome::Committed {
            summary,
            newly_registered,
        })
    }

    /// Caller's catalog, newest first. Creates an empty catalog on first use.
    pub fn get_files(&self, caller: &Identity) -> Result<Vec<FileSummary>> {
        self.store.ensure_catalog(caller)?;
        let files: Vec<FileSummary> = self
            .store
            .catalog_list(caller)?
            .iter()
            .map(FileRecord::summary)
            .collect();
        debug!(owner = %caller, count = files.len(), "Listed catalog");
        Ok(files)
    }

    /// The caller's own record, content included. Other owners' content is
    /// never reachable through this call.
    pub fn get_file_content(&self, caller: &Identity, name: &str) -> Result<Option<FileRecord>> {
        Ok(self.store.catalog_get(caller, name)?)
    }

    /// Remove one of the caller's catalog entries. Returns whether it existed.
    pub fn delete_file(&self, caller: &Identity, name: &str) -> Result<bool> {
        let _gate = self.write_gate.lock();

        let Some(removed) = self.store.catalog_remove(caller, name)? else {
            return Ok(false);
        };
        self.reclaim_if_orphaned(caller, removed.content_hash())?;

        metrics::counter!("cairn_deletes_total").increment(1);
        self.publish_registry_size()?;
        info!(owner = %caller, name = %name, hash = %removed.content_hash(), "Deleted catalog entry");
        Ok(true)
    }

    pub fn verify_file_by_hash(&self, hash: &ContentHash) -> Result<Option<Verification>> {
        let verification = self.store.lookup(hash)?.map(|record| record.verification());
        debug!(hash = %hash, found = verification.is_some(), "Verified content hash");
        Ok(verification)
    }

    /// Scan the whole registry for fingerprints within `threshold` percent.
    /// `None` uses the configured default.
    pub fn find_similar(
        &self,
        query: Fingerprint,
        threshold: Option<u8>,
    ) -> Result<Vec<SimilarMatch>> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        if threshold > 100 {
            return Err(RegistryError::InvalidThreshold(u32::from(threshold)));
        }

        let entries = self.store.entries()?;
        let matches = similarity::find_similar(&entries, query, threshold);

        metrics::counter!("cairn_similarity_queries_total").increment(1);
        debug!(
            fingerprint = %query,
            threshold,
            scanned = entries.len(),
            matched = matches.len(),
            "Similarity scan"
        );
        Ok(matches)
    }

    pub fn send_dummy_notification(&self, caller: &Identity) -> Result<String> {
        self.store.append_alert(caller, DUMMY_NOTIFICATION)?;
        Ok("Dummy notification sent".to_string())
    }

    pub fn get_alerts(&self, caller: &Identity) -> Result<Vec<String>> {
        Ok(self.store.alerts(caller)?)
    }

    pub fn registry_len(&self) -> Result<u64> {
        Ok(self.store.registry_len()?)
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        Ok(())
    }

    /// Drop the global claim on `hash` when the retention policy allows it,
    /// the claim belongs to `owner`, and no catalog entry of theirs still
    /// holds the content. Must be called with the write gate held.
    fn reclaim_if_orphaned(&self, owner: &Identity, hash: &ContentHash) -> Result<bool> {
        if self.config.retention != RetentionPolicy::ReclaimOrphans {
            return Ok(false);
        }
        let Some(registered) = self.store.lookup(hash)? else {
            return Ok(false);
        };
        if registered.owner() != owner || self.store.catalog_references(owner, hash)? {
            return Ok(false);
        }

        self.store.unregister(hash)?;
        info!(owner = %owner, hash = %hash, "Released orphaned content registration");
        Ok(true)
    }

    fn publish_registry_size(&self) -> Result<()> {
        let entries = self.store.registry_len()?;
        metrics::gauge!("cairn_registry_entries").set(entries as f64);
        Ok(())
    }
}
