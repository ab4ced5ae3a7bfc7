//! Storage backends for the registry tables.

use crate::catalog::OwnerCatalogs;
use crate::hash::ContentHash;
use crate::outbox::AlertOutbox;
use crate::record::{FileRecord, Identity};
use crate::registry::GlobalRegistry;
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// Trait for registry storage backends.
///
/// Each method is atomic on its own. Multi-step sequences (check then
/// register) are serialized by [`crate::FileRegistry`], not by the store.
pub trait RegistryStore: Send + Sync {
    /// Look up the global registration for a content hash.
    fn lookup(&self, hash: &ContentHash) -> Result<Option<FileRecord>>;

    /// Register a record under its content hash. Returns `false` and leaves
    /// the existing entry in place if the hash is already registered.
    fn register(&self, record: FileRecord) -> Result<bool>;

    /// Remove a global registration.
    fn unregister(&self, hash: &ContentHash) -> Result<Option<FileRecord>>;

    /// Snapshot of every registered record.
    fn entries(&self) -> Result<Vec<FileRecord>>;

    /// Number of registered hashes.
    fn registry_len(&self) -> Result<u64>;

    /// Make sure the owner has a (possibly empty) catalog.
    fn ensure_catalog(&self, owner: &Identity) -> Result<()>;

    fn catalog_get(&self, owner: &Identity, name: &str) -> Result<Option<FileRecord>>;

    /// Insert or overwrite the owner's entry named after the record.
    fn catalog_put(&self, owner: &Identity, record: FileRecord) -> Result<Option<FileRecord>>;

    fn catalog_remove(&self, owner: &Identity, name: &str) -> Result<Option<FileRecord>>;

    /// Owner's catalog, newest first.
    fn catalog_list(&self, owner: &Identity) -> Result<Vec<FileRecord>>;

    /// True if any entry in the owner's catalog holds this content.
    fn catalog_references(&self, owner: &Identity, hash: &ContentHash) -> Result<bool> {
        Ok(self
            .catalog_list(owner)?
            .iter()
            .any(|record| record.content_hash() == hash))
    }

    fn append_alert(&self, owner: &Identity, message: &str) -> Result<()>;

    /// Full alert list for the owner, oldest first.
    fn alerts(&self, owner: &Identity) -> Result<Vec<String>>;

    /// Persist buffered writes.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Short backend label for logs and `/health`.
    fn backend_name(&self) -> &'static str;
}

/// In-memory registry storage (for testing and single-process deployments).
#[derive(Clone)]
pub struct MemoryRegistryStore {
    inner: Arc<MemoryRegistryStoreInner>,
}

struct MemoryRegistryStoreInner {
    global: RwLock<GlobalRegistry>,
    catalogs: RwLock<OwnerCatalogs>,
    outbox: RwLock<AlertOutbox>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryRegistryStoreInner {
                global: RwLock::new(GlobalRegistry::new()),
                catalogs: RwLock::new(OwnerCatalogs::new()),
                outbox: RwLock::new(AlertOutbox::new()),
            }),
        }
    }
}

impl Default for MemoryRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn lookup(&self, hash: &ContentHash) -> Result<Option<FileRecord>> {
        Ok(self.inner.global.read().lookup(hash).cloned())
    }

    fn register(&self, record: FileRecord) -> Result<bool> {
        Ok(self.inner.global.write().register(record))
    }

    fn unregister(&self, hash: &ContentHash) -> Result<Option<FileRecord>> {
        Ok(self.inner.global.write().unregister(hash))
    }

    fn entries(&self) -> Result<Vec<FileRecord>> {
        Ok(self.inner.global.read().entries())
    }

    fn registry_len(&self) -> Result<u64> {
        Ok(self.inner.global.read().len() as u64)
    }

    fn ensure_catalog(&self, owner: &Identity) -> Result<()> {
        self.inner.catalogs.write().ensure(owner);
        Ok(())
    }

    fn catalog_get(&self, owner: &Identity, name: &str) -> Result<Option<FileRecord>> {
        Ok(self.inner.catalogs.read().get(owner, name).cloned())
    }

    fn catalog_put(&self, owner: &Identity, record: FileRecord) -> Result<Option<FileRecord>> {
        Ok(self.inner.catalogs.write().put(owner, record))
    }

    fn catalog_remove(&self, owner: &Identity, name: &str) -> Result<Option<FileRecord>> {
        Ok(self.inner.catalogs.write().remove(owner, name))
    }

    fn catalog_list(&self, owner: &Identity) -> Result<Vec<FileRecord>> {
        Ok(self.inner.catalogs.read().list(owner))
    }

    fn catalog_references(&self, owner: &Identity, hash: &ContentHash) -> Result<bool> {
        Ok(self.inner.catalogs.read().references(owner, hash))
    }

    fn append_alert(&self, owner: &Identity, message: &str) -> Result<()> {
        self.inner.outbox.write().append(owner, message);
        Ok(())
    }

    fn alerts(&self, owner: &Identity) -> Result<Vec<String>> {
        Ok(self.inner.outbox.read().peek(owner))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
