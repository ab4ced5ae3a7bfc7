//! Per-owner file catalogs.

use crate::hash::ContentHash;
use crate::record::{FileRecord, Identity};
use std::collections::HashMap;

/// One identity's namespace: file name → record.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, FileRecord>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&FileRecord> {
        self.entries.get(name)
    }

    /// Insert or overwrite the slot named after the record, returning the previous entry.
    pub fn put(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.entries.insert(record.name().to_string(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<FileRecord> {
        self.entries.remove(name)
    }

    pub fn references(&self, hash: &ContentHash) -> bool {
        self.entries
            .values()
            .any(|record| record.content_hash() == hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All records, newest first, ties by name.
    pub fn records(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self.entries.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at_us()
                .cmp(&a.created_at_us())
                .then_with(|| a.name().cmp(b.name()))
        });
        records
    }
}

/// Catalogs of every identity seen so far.
#[derive(Debug, Clone, Default)]
pub struct OwnerCatalogs {
    catalogs: HashMap<Identity, Catalog>,
}

impl OwnerCatalogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the owner's catalog, creating an empty one on first access.
    pub fn ensure(&mut self, owner: &Identity) -> &mut Catalog {
        self.catalogs.entry(owner.clone()).or_default()
    }

    pub fn catalog(&self, owner: &Identity) -> Option<&Catalog> {
        self.catalogs.get(owner)
    }

    pub fn get(&self, owner: &Identity, name: &str) -> Option<&FileRecord> {
        self.catalogs.get(owner).and_then(|catalog| catalog.get(name))
    }

    pub fn put(&mut self, owner: &Identity, record: FileRecord) -> Option<FileRecord> {
        self.ensure(owner).put(record)
    }

    pub fn remove(&mut self, owner: &Identity, name: &str) -> Option<FileRecord> {
        self.catalogs
            .get_mut(owner)
            .and_then(|catalog| catalog.remove(name))
    }

    pub fn list(&self, owner: &Identity) -> Vec<FileRecord> {
        self.catalogs
            .get(owner)
            .map(Catalog::records)
            .unwrap_or_default()
    }

    pub fn references(&self, owner: &Identity, hash: &ContentHash) -> bool {
        self.catalogs
            .get(owner)
            .is_some_and(|catalog| catalog.references(hash))
    }

    /// Number of identities with a catalog.
    pub fn owner_count(&self) -> usize {
        self.catalogs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::Fingerprint;
    use cairn_time::CairnTimeMicros;

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    fn record(owner: &Identity, name: &str, content: &[u8], time: u64) -> FileRecord {
        FileRecord::new_at_time(
            owner.clone(),
            name.to_string(),
            content.to_vec(),
            "text/plain".to_string(),
            Fingerprint::from_u64(0),
            CairnTimeMicros(time),
        )
    }

    #[test]
    fn ensure_creates_once() {
        let mut catalogs = OwnerCatalogs::new();
        let alice = id("alice");

        assert!(catalogs.catalog(&alice).is_none());
        catalogs.ensure(&alice).put(record(&alice, "a", b"1", 1));
        catalogs.ensure(&alice);

        assert_eq!(catalogs.owner_count(), 1);
        assert_eq!(catalogs.catalog(&alice).unwrap().len(), 1);
    }

    #[test]
    fn names_are_case_sensitive_and_isolated_per_owner() {
        let mut catalogs = OwnerCatalogs::new();
        let alice = id("alice");
        let bob = id("bob");

        catalogs.put(&alice, record(&alice, "Report.pdf", b"1", 1));

        assert!(catalogs.get(&alice, "Report.pdf").is_some());
        assert!(catalogs.get(&alice, "report.pdf").is_none());
        assert!(catalogs.get(&alice, " Report.pdf").is_none());
        assert!(catalogs.get(&bob, "Report.pdf").is_none());
    }

    #[test]
    fn put_overwrites_and_returns_previous() {
        let mut catalogs = OwnerCatalogs::new();
        let alice = id("alice");

        assert!(catalogs.put(&alice, record(&alice, "x", b"one", 1)).is_none());
        let previous = catalogs
            .put(&alice, record(&alice, "x", b"two", 2))
            .expect("previous entry");

        assert_eq!(previous.content(), b"one");
        assert_eq!(catalogs.get(&alice, "x").unwrap().content(), b"two");
        assert_eq!(catalogs.list(&alice).len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut catalogs = OwnerCatalogs::new();
        let alice = id("alice");
        catalogs.put(&alice, record(&alice, "x", b"one", 1));

        assert!(catalogs.remove(&alice, "x").is_some());
        assert!(catalogs.remove(&alice, "x").is_none());
        assert!(catalogs.remove(&id("nobody"), "x").is_none());
    }

    #[test]
    fn list_contains_each_record_once_newest_first() {
        let mut catalogs = OwnerCatalogs::new();
        let alice = id("alice");
        catalogs.put(&alice, record(&alice, "old", b"1", 10));
        catalogs.put(&alice, record(&alice, "new", b"2", 30));
        catalogs.put(&alice, record(&alice, "mid", b"3", 20));

        let names: Vec<String> = catalogs
            .list(&alice)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
        assert!(catalogs.list(&id("bob")).is_empty());
    }

    #[test]
    fn references_tracks_content_hash() {
        let mut catalogs = OwnerCatalogs::new();
        let alice = id("alice");
        let rec = record(&alice, "x", b"payload", 1);
        let hash = *rec.content_hash();
        catalogs.put(&alice, rec);

        assert!(catalogs.references(&alice, &hash));
        catalogs.remove(&alice, "x");
        assert!(!catalogs.references(&alice, &hash));
    }
}
