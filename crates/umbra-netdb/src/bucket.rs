//! Distance bucket for the routing table

use std::collections::HashMap;

use umbra_protocol::RecordHash;

use crate::records::Record;

/// Records at a single XOR distance from the local identity
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// Bucket index (0-256)
    pub index: usize,

    /// Records keyed by their own hash
    records: HashMap<RecordHash, Record>,
}

impl Bucket {
    /// Create a new empty bucket
    pub fn new(index: usize) -> Self {
        Bucket {
            index,
            records: HashMap::new(),
        }
    }

    /// Number of records in this bucket
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if bucket is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace a record; returns true if the key was new
    pub fn upsert(&mut self, hash: RecordHash, record: Record) -> bool {
        self.records.insert(hash, record).is_none()
    }

    /// Get a record by hash
    pub fn get(&self, hash: &RecordHash) -> Option<&Record> {
        self.records.get(hash)
    }

    /// Remove a record by hash
    pub fn remove(&mut self, hash: &RecordHash) -> Option<Record> {
        self.records.remove(hash)
    }

    /// Records in hash order
    ///
    /// The map itself iterates in arbitrary order; sorting by key makes the
    /// within-bucket order stable for a given table snapshot.
    pub fn sorted_records(&self) -> Vec<&Record> {
        let mut entries: Vec<(&RecordHash, &Record)> = self.records.iter().collect();
        entries.sort_by_key(|(hash, _)| **hash);
        entries.into_iter().map(|(_, record)| record).collect()
    }

    /// Drop records failing the predicate; returns how many were removed
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Record) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|_, record| keep(record));
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Record, RouterAddress, RouterInfo};
    use umbra_crypto::RouterIdentity;

    fn create_test_record() -> Record {
        let identity = RouterIdentity::generate().unwrap();
        Record::RouterInfo(RouterInfo::new(&identity, RouterAddress::new("10.0.0.1", 4100)))
    }

    #[test]
    fn test_empty_bucket() {
        let bucket = Bucket::new(3);
        assert!(bucket.is_empty());
        assert_eq!(bucket.len(), 0);
        assert_eq!(bucket.index, 3);
    }

    #[test]
    fn test_upsert_and_get() {
        let mut bucket = Bucket::new(0);
        let record = create_test_record();
        let hash = record.hash();

        assert!(bucket.upsert(hash, record.clone()));
        assert_eq!(bucket.len(), 1);
        assert!(bucket.get(&hash).is_some());

        // Re-inserting the same key is an update, not a new entry
        assert!(!bucket.upsert(hash, record));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut bucket = Bucket::new(0);
        let record = create_test_record();
        let hash = record.hash();

        bucket.upsert(hash, record);
        assert!(bucket.remove(&hash).is_some());
        assert!(bucket.is_empty());
        assert!(bucket.remove(&hash).is_none());
    }

    #[test]
    fn test_sorted_records_stable() {
        let mut bucket = Bucket::new(0);
        for _ in 0..8 {
            let record = create_test_record();
            bucket.upsert(record.hash(), record);
        }

        let first: Vec<_> = bucket.sorted_records().iter().map(|r| r.hash()).collect();
        let second: Vec<_> = bucket.sorted_records().iter().map(|r| r.hash()).collect();
        assert_eq!(first, second);

        let mut expected = first.clone();
        expected.sort();
        assert_eq!(first, expected);
    }

    #[test]
    fn test_retain() {
        let mut bucket = Bucket::new(0);
        let keep = create_test_record();
        let drop = create_test_record();
        let keep_hash = keep.hash();
        let drop_hash = drop.hash();

        bucket.upsert(keep_hash, keep);
        bucket.upsert(drop_hash, drop);

        let removed = bucket.retain(|record| record.hash() == keep_hash);
        assert_eq!(removed, 1);
        assert!(bucket.get(&keep_hash).is_some());
        assert!(bucket.get(&drop_hash).is_none());
    }
}
