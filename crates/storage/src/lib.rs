//! Persistent registry storage on sled.
//!
//! Three trees mirror the logical tables of the registry:
//!
//! - `global`: content hash (hex) → bincode `FileRecord`
//! - `catalogs`: `identity 0x00 name` → bincode `FileRecord`
//! - `outbox`: `identity 0x00 seq_be_u64` → bincode `String`
//!
//! Identities and names never contain control characters, so `0x00` is a
//! safe separator and a prefix scan on `identity 0x00` covers exactly one
//! owner. Outbox sequence numbers come from `Db::generate_id`, which is
//! monotonic across restarts, so key order is append order.

use anyhow::Result;
use cairn_files::{ContentHash, FileRecord, Identity, RegistryStore};
use sled::{CompareAndSwapError, Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

const KEY_SEPARATOR: u8 = 0x00;

pub struct SledRegistryStore {
    db: Db,
    global: Tree,
    catalogs: Tree,
    outbox: Tree,
}

impl SledRegistryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(StorageError::from)?;
        let store = Self::with_db(db)?;
        let newest_us = store.newest_timestamp_us()?;
        if let Some(newest_us) = newest_us {
            cairn_time::advance_to(newest_us);
        }
        info!(
            path = %path.display(),
            registered = store.global.len(),
            newest_us = ?newest_us,
            "Opened sled registry store"
        );
        Ok(store)
    }

    /// Throwaway store that lives only as long as the process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(StorageError::from)?;
        Self::with_db(db)
    }

    fn with_db(db: Db) -> Result<Self> {
        let global = db.open_tree("global").map_err(StorageError::from)?;
        let catalogs = db.open_tree("catalogs").map_err(StorageError::from)?;
        let outbox = db.open_tree("outbox").map_err(StorageError::from)?;
        Ok(Self {
            db,
            global,
            catalogs,
            outbox,
        })
    }
}

impl SledRegistryStore {
    /// Latest `created_at_us` across both record trees.
    fn newest_timestamp_us(&self) -> Result<Option<u64>> {
        let mut newest = None;
        for tree in [&self.global, &self.catalogs] {
            for entry in tree.iter() {
                let (_, value) = entry.map_err(StorageError::from)?;
                let created = decode_record(&value)?.created_at_us();
                newest = newest.max(Some(created));
            }
        }
        Ok(newest)
    }
}

fn owner_prefix(owner: &Identity) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.as_str().len() + 1);
    key.extend_from_slice(owner.as_str().as_bytes());
    key.push(KEY_SEPARATOR);
    key
}

fn catalog_key(owner: &Identity, name: &str) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(name.as_bytes());
    key
}

fn outbox_key(owner: &Identity, seq: u64) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn encode_record(record: &FileRecord) -> Result<Vec<u8>> {
    Ok(bincode::serialize(record).map_err(StorageError::from)?)
}

fn decode_record(bytes: &IVec) -> Result<FileRecord> {
    Ok(bincode::deserialize(bytes).map_err(StorageError::from)?)
}

fn decode_optional(value: Option<IVec>) -> Result<Option<FileRecord>> {
    value.as_ref().map(decode_record).transpose()
}

impl RegistryStore for SledRegistryStore {
    fn lookup(&self, hash: &ContentHash) -> Result<Option<FileRecord>> {
        let value = self
            .global
            .get(hash.to_hex().as_bytes())
            .map_err(StorageError::from)?;
        decode_optional(value)
    }

    fn register(&self, record: FileRecord) -> Result<bool> {
        let key = record.content_hash().to_hex();
        let value = encode_record(&record)?;
        let swapped = self
            .global
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(StorageError::from)?;
        match swapped {
            Ok(()) => Ok(true),
            Err(CompareAndSwapError { .. }) => {
                debug!(hash = %key, "Content hash already registered");
                Ok(false)
            }
        }
    }

    fn unregister(&self, hash: &ContentHash) -> Result<Option<FileRecord>> {
        let value = self
            .global
            .remove(hash.to_hex().as_bytes())
            .map_err(StorageError::from)?;
        decode_optional(value)
    }

    fn entries(&self) -> Result<Vec<FileRecord>> {
        self.global
            .iter()
            .map(|entry| {
                let (_, value) = entry.map_err(StorageError::from)?;
                decode_record(&value)
            })
            .collect()
    }

    fn registry_len(&self) -> Result<u64> {
        Ok(self.global.len() as u64)
    }

    fn ensure_catalog(&self, _owner: &Identity) -> Result<()> {
        // Catalogs are key ranges; an owner without entries already has an
        // empty one.
        Ok(())
    }

    fn catalog_get(&self, owner: &Identity, name: &str) -> Result<Option<FileRecord>> {
        let value = self
            .catalogs
            .get(catalog_key(owner, name))
            .map_err(StorageError::from)?;
        decode_optional(value)
    }

    fn catalog_put(&self, owner: &Identity, record: FileRecord) -> Result<Option<FileRecord>> {
        let key = catalog_key(owner, record.name());
        let value = encode_record(&record)?;
        let previous = self.catalogs.insert(key, value).map_err(StorageError::from)?;
        decode_optional(previous)
    }

    fn catalog_remove(&self, owner: &Identity, name: &str) -> Result<Option<FileRecord>> {
        let previous = self
            .catalogs
            .remove(catalog_key(owner, name))
            .map_err(StorageError::from)?;
        decode_optional(previous)
    }

    fn catalog_list(&self, owner: &Identity) -> Result<Vec<FileRecord>> {
        let mut records = self
            .catalogs
            .scan_prefix(owner_prefix(owner))
            .map(|entry| {
                let (_, value) = entry.map_err(StorageError::from)?;
                decode_record(&value)
            })
            .collect::<Result<Vec<_>>>()?;

        records.sort_by(|a, b| {
            b.created_at_us()
                .cmp(&a.created_at_us())
                .then_with(|| a.name().cmp(b.name()))
        });
        Ok(records)
    }

    fn append_alert(&self, owner: &Identity, message: &str) -> Result<()> {
        let seq = self.db.generate_id().map_err(StorageError::from)?;
        let value = bincode::serialize(message).map_err(StorageError::from)?;
        self.outbox
            .insert(outbox_key(owner, seq), value)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn alerts(&self, owner: &Identity) -> Result<Vec<String>> {
        self.outbox
            .scan_prefix(owner_prefix(owner))
            .map(|entry| {
                let (_, value) = entry.map_err(StorageError::from)?;
                Ok(bincode::deserialize::<String>(&value).map_err(StorageError::from)?)
            })
            .collect()
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StorageError::from)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_files::Fingerprint;
    use cairn_time::CairnTimeMicros;

    fn record(owner: &str, name: &str, content: &[u8], time: u64) -> FileRecord {
        FileRecord::new_at_time(
            Identity::new(owner).unwrap(),
            name.to_string(),
            content.to_vec(),
            "text/plain".to_string(),
            Fingerprint::from_u64(0x1234),
            CairnTimeMicros(time),
        )
    }

    #[test]
    fn test_register_is_first_writer_wins() {
        let store = SledRegistryStore::temporary().unwrap();
        let first = record("alice", "first", b"same", 1);
        let second = record("alice", "second", b"same", 2);

        assert!(store.register(first.clone()).unwrap());
        assert!(!store.register(second).unwrap());
        assert_eq!(store.lookup(first.content_hash()).unwrap(), Some(first));
        assert_eq!(store.registry_len().unwrap(), 1);
    }

    #[test]
    fn test_owner_prefix_does_not_leak_between_owners() {
        let store = SledRegistryStore::temporary().unwrap();
        let al = Identity::new("al").unwrap();
        let alice = Identity::new("alice").unwrap();

        store.catalog_put(&al, record("al", "x", b"1", 1)).unwrap();
        store.catalog_put(&alice, record("alice", "y", b"2", 2)).unwrap();
        store.append_alert(&alice, "for alice").unwrap();

        let names: Vec<String> = store
            .catalog_list(&al)
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["x"]);
        assert!(store.alerts(&al).unwrap().is_empty());
    }

    #[test]
    fn test_alert_order_is_append_order() {
        let store = SledRegistryStore::temporary().unwrap();
        let alice = Identity::new("alice").unwrap();

        for i in 0..20 {
            store.append_alert(&alice, &format!("alert {i}")).unwrap();
        }

        let alerts = store.alerts(&alice).unwrap();
        assert_eq!(alerts.len(), 20);
        assert_eq!(alerts[0], "alert 0");
        assert_eq!(alerts[19], "alert 19");
    }

    #[test]
    fn test_catalog_put_returns_previous() {
        let store = SledRegistryStore::temporary().unwrap();
        let alice = Identity::new("alice").unwrap();

        assert!(store
            .catalog_put(&alice, record("alice", "x", b"one", 1))
            .unwrap()
            .is_none());
        let previous = store
            .catalog_put(&alice, record("alice", "x", b"two", 2))
            .unwrap()
            .unwrap();
        assert_eq!(previous.content(), b"one");
        assert_eq!(store.catalog_list(&alice).unwrap().len(), 1);
    }
}
