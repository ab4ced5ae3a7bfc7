//! Global content registry.
//!
//! Maps a content hash to the record that first claimed it. The map itself
//! does no compare-and-swap: [`crate::FileRegistry`] serializes the
//! lookup-then-register sequence.

use crate::hash::ContentHash;
use crate::record::FileRecord;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct GlobalRegistry {
    entries: HashMap<ContentHash, FileRecord>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, hash: &ContentHash) -> Option<&FileRecord> {
        self.entries.get(hash)
    }

    /// Insert a record under its own content hash.
    ///
    /// The caller must have checked that `lookup` returned nothing; an existing
    /// entry is left untouched so the first registration always wins.
    pub fn register(&mut self, record: FileRecord) -> bool {
        let hash = *record.content_hash();
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.entries.insert(hash, record);
        true
    }

    pub fn unregister(&mut self, hash: &ContentHash) -> Option<FileRecord> {
        self.entries.remove(hash)
    }

    /// Snapshot of all records, in no particular order.
    pub fn entries(&self) -> Vec<FileRecord> {
        self.entries.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Identity;
    use crate::similarity::Fingerprint;
    use cairn_time::CairnTimeMicros;

    fn record(owner: &str, name: &str, content: &[u8]) -> FileRecord {
        FileRecord::new_at_time(
            Identity::new(owner).unwrap(),
            name.to_string(),
            content.to_vec(),
            "text/plain".to_string(),
            Fingerprint::from_u64(0),
            CairnTimeMicros(1),
        )
    }

    #[test]
    fn register_then_lookup() {
        let mut registry = GlobalRegistry::new();
        let rec = record("alice", "a.txt", b"hello");
        let hash = *rec.content_hash();

        assert!(registry.lookup(&hash).is_none());
        assert!(registry.register(rec.clone()));
        assert_eq!(registry.lookup(&hash), Some(&rec));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = GlobalRegistry::new();
        let first = record("alice", "first.txt", b"same");
        let second = record("alice", "second.txt", b"same");

        assert!(registry.register(first.clone()));
        assert!(!registry.register(second));

        let stored = registry.lookup(first.content_hash()).unwrap();
        assert_eq!(stored.name(), "first.txt");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_entry() {
        let mut registry = GlobalRegistry::new();
        let rec = record("alice", "a", b"bytes");
        let hash = *rec.content_hash();
        registry.register(rec);

        assert!(registry.unregister(&hash).is_some());
        assert!(registry.unregister(&hash).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn entries_snapshot_contains_all() {
        let mut registry = GlobalRegistry::new();
        registry.register(record("alice", "a", b"1"));
        registry.register(record("bob", "b", b"2"));
        registry.register(record("carol", "c", b"3"));

        let mut names: Vec<String> = registry
            .entries()
            .into_iter()
            .map(|r| r.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
