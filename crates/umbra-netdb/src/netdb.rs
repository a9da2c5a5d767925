//! Network database keyed by XOR distance
//!
//! Records live in the bucket at index `256 - leading_zero_bits(local XOR
//! record)`: bucket 0 holds hashes identical to the local identity, bucket
//! 256 hashes differing in their first bit. The same formula drives store,
//! lookup and the nearest-neighbour walk; the two interpretations are never
//! mixed.

use std::sync::RwLock;

use tracing::{debug, warn};

use umbra_protocol::{RecordHash, MAX_BUCKET};

use crate::bucket::Bucket;
use crate::records::{Record, RouterInfo};
use crate::BUCKET_COUNT;

/// Bucket visit order for a nearest-neighbour walk starting at `start`:
/// start, start-1, start+1, start-2, start+2, ... clamped to [0, 256].
///
/// The downward (closer) side is visited first at every offset.
fn bucket_walk(start: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(BUCKET_COUNT);
    order.push(start);

    for offset in 1..=MAX_BUCKET {
        if start >= offset {
            order.push(start - offset);
        }
        if start + offset <= MAX_BUCKET {
            order.push(start + offset);
        }
    }

    order
}

/// The shared record store
///
/// All operations serialize against one table-wide lock; callers never
/// observe a partially applied mutation.
#[derive(Debug)]
pub struct NetDb {
    /// Identity hash of the local router
    local_key: RecordHash,

    /// 257 buckets, one per possible XOR distance
    table: RwLock<Vec<Bucket>>,
}

impl NetDb {
    /// Create an empty database for the given local identity hash
    pub fn new(local_key: RecordHash) -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        for i in 0..BUCKET_COUNT {
            buckets.push(Bucket::new(i));
        }

        NetDb {
            local_key,
            table: RwLock::new(buckets),
        }
    }

    /// Identity hash this table is centered on
    pub fn local_key(&self) -> &RecordHash {
        &self.local_key
    }

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, Vec<Bucket>> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Bucket>> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Total records across all buckets
    pub fn record_count(&self) -> usize {
        self.read_table().iter().map(|bucket| bucket.len()).sum()
    }

    /// Insert a record, keyed by its own hash
    ///
    /// A record whose signature does not verify is logged and dropped; the
    /// caller sees `false`, never an error. Adversarial records are an
    /// expected condition, not a crash.
    pub fn store(&self, record: Record) -> bool {
        if !record.verify_signature() {
            warn!(
                record_type = ?record.record_type(),
                hash = %record.hash(),
                "dropping record with invalid signature"
            );
            return false;
        }

        let hash = record.hash();
        let bucket_idx = self.local_key.distance_bucket(&hash);
        debug_assert!(bucket_idx <= MAX_BUCKET, "bucket index out of range");

        let mut table = self.write_table();
        let inserted = table[bucket_idx].upsert(hash, record);
        debug!(hash = %hash, bucket = bucket_idx, inserted, "stored record");
        true
    }

    /// Exact lookup by record hash
    pub fn lookup(&self, hash: &RecordHash) -> Option<Record> {
        let bucket_idx = self.local_key.distance_bucket(hash);
        self.read_table()[bucket_idx].get(hash).cloned()
    }

    /// Remove a record by hash
    pub fn remove(&self, hash: &RecordHash) -> Option<Record> {
        let bucket_idx = self.local_key.distance_bucket(hash);
        self.write_table()[bucket_idx].remove(hash)
    }

    /// The k records closest to `key`
    ///
    /// The walk starts at the bucket for `key` and alternates outward,
    /// closer side first; within a bucket records come in stable hash order.
    pub fn k_closest_records(&self, key: &RecordHash, k: usize) -> Vec<Record> {
        self.collect_closest(key, k, |record| Some(record.clone()))
    }

    /// The k RouterInfos closest to `key`
    ///
    /// Returns fewer than k only when the table holds fewer than k
    /// RouterInfo records overall.
    pub fn k_closest_router_infos(&self, key: &RecordHash, k: usize) -> Vec<RouterInfo> {
        self.collect_closest(key, k, |record| record.as_router_info().cloned())
    }

    fn collect_closest<T, F>(&self, key: &RecordHash, k: usize, mut select: F) -> Vec<T>
    where
        F: FnMut(&Record) -> Option<T>,
    {
        let start = self.local_key.distance_bucket(key);
        let table = self.read_table();

        let mut collected = Vec::with_capacity(k);
        for bucket_idx in bucket_walk(start) {
            if collected.len() >= k {
                break;
            }
            for record in table[bucket_idx].sorted_records() {
                if collected.len() >= k {
                    break;
                }
                if let Some(item) = select(record) {
                    collected.push(item);
                }
            }
        }

        collected
    }

    /// Drop lease sets whose every lease has expired
    ///
    /// Leases are refreshed as tunnels rebuild; a fully expired set names no
    /// reachable endpoint and only wastes lookups.
    pub fn remove_expired_leases(&self, now_ms: i64) -> usize {
        let mut table = self.write_table();

        let mut removed = 0;
        for bucket in table.iter_mut() {
            removed += bucket.retain(|record| match record {
                Record::LeaseSet(set) => !set.is_expired(now_ms),
                Record::RouterInfo(_) => true,
            });
        }

        if removed > 0 {
            debug!(removed, "swept expired lease sets");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Lease, LeaseSet, RouterAddress};
    use umbra_crypto::{DestinationIdentity, RouterIdentity};
    use umbra_protocol::TunnelId;

    fn create_router_record() -> Record {
        let identity = RouterIdentity::generate().unwrap();
        Record::RouterInfo(RouterInfo::new(
            &identity,
            RouterAddress::new("10.0.0.1", 4100),
        ))
    }

    fn create_lease_record(expiration: i64) -> Record {
        let identity = DestinationIdentity::generate().unwrap();
        let encryption_key = identity.destination().encryption_key;
        Record::LeaseSet(LeaseSet::new(
            &identity,
            encryption_key,
            None,
            vec![Lease {
                gateway: RecordHash::from_bytes([1u8; 32]),
                tunnel: TunnelId(1),
                expiration,
            }],
        ))
    }

    fn local_db() -> NetDb {
        NetDb::new(RecordHash::from_bytes([0u8; 32]))
    }

    #[test]
    fn test_bucket_walk_order() {
        let order = bucket_walk(3);
        assert_eq!(&order[..7], &[3, 2, 4, 1, 5, 0, 6]);
        assert_eq!(order.len(), BUCKET_COUNT);
    }

    #[test]
    fn test_bucket_walk_at_edges() {
        let from_zero = bucket_walk(0);
        assert_eq!(&from_zero[..4], &[0, 1, 2, 3]);
        assert_eq!(from_zero.len(), BUCKET_COUNT);

        let from_max = bucket_walk(MAX_BUCKET);
        assert_eq!(&from_max[..4], &[256, 255, 254, 253]);
        assert_eq!(from_max.len(), BUCKET_COUNT);
    }

    #[test]
    fn test_bucket_walk_covers_every_bucket_once() {
        for start in [0, 1, 77, 128, 255, 256] {
            let mut order = bucket_walk(start);
            order.sort_unstable();
            let expected: Vec<usize> = (0..BUCKET_COUNT).collect();
            assert_eq!(order, expected, "walk from {start}");
        }
    }

    #[test]
    fn test_store_and_lookup() {
        let db = local_db();
        let record = create_router_record();
        let hash = record.hash();

        assert!(db.store(record.clone()));
        assert_eq!(db.record_count(), 1);
        assert_eq!(db.lookup(&hash), Some(record));
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let db = local_db();
        assert!(db.lookup(&RecordHash::from_bytes([9u8; 32])).is_none());
    }

    #[test]
    fn test_bad_signature_never_stored() {
        let db = local_db();

        let record = match create_router_record() {
            Record::RouterInfo(mut info) => {
                info.published += 1; // invalidates the signature
                Record::RouterInfo(info)
            }
            other => other,
        };
        let hash = record.hash();

        assert!(!db.store(record));
        assert_eq!(db.record_count(), 0);
        assert!(db.lookup(&hash).is_none());
    }

    #[test]
    fn test_store_is_upsert() {
        let db = local_db();
        let record = create_router_record();

        assert!(db.store(record.clone()));
        assert!(db.store(record));
        assert_eq!(db.record_count(), 1);
    }

    #[test]
    fn test_record_stored_at_metric_bucket() {
        let db = local_db();
        let record = create_router_record();
        let hash = record.hash();
        db.store(record);

        let bucket_idx = db.local_key().distance_bucket(&hash);
        let table = db.read_table();
        assert!(table[bucket_idx].get(&hash).is_some());
    }

    #[test]
    fn test_k_closest_limits() {
        let db = local_db();
        for _ in 0..10 {
            db.store(create_router_record());
        }

        let key = RecordHash::from_bytes([5u8; 32]);
        assert_eq!(db.k_closest_records(&key, 3).len(), 3);
        assert_eq!(db.k_closest_records(&key, 100).len(), 10);
    }

    #[test]
    fn test_k_closest_router_infos_filters_lease_sets() {
        let db = local_db();
        for _ in 0..3 {
            db.store(create_router_record());
        }
        for _ in 0..5 {
            db.store(create_lease_record(i64::MAX));
        }

        let key = RecordHash::from_bytes([5u8; 32]);
        let routers = db.k_closest_router_infos(&key, 10);

        // Fewer than k only because the table holds fewer RouterInfos than k
        assert_eq!(routers.len(), 3);
    }

    #[test]
    fn test_k_closest_walk_ordering() {
        let db = local_db();
        let mut stored = Vec::new();
        for _ in 0..24 {
            let record = create_router_record();
            stored.push(record.hash());
            db.store(record);
        }

        let key = RecordHash::from_bytes([0x55u8; 32]);
        let closest = db.k_closest_records(&key, 24);
        assert_eq!(closest.len(), 24);

        // Reference order: walk position of the record's bucket, then hash
        let start = db.local_key().distance_bucket(&key);
        let walk = bucket_walk(start);
        let position = |hash: &RecordHash| {
            let bucket = db.local_key().distance_bucket(hash);
            walk.iter().position(|idx| *idx == bucket).unwrap()
        };

        let mut expected = stored.clone();
        expected.sort_by_key(|hash| (position(hash), *hash));

        let actual: Vec<RecordHash> = closest.iter().map(|record| record.hash()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_remove_expired_leases() {
        let db = local_db();
        let live = create_lease_record(i64::MAX);
        let dead = create_lease_record(1000);
        let router = create_router_record();
        let live_hash = live.hash();
        let dead_hash = dead.hash();

        db.store(live);
        db.store(dead);
        db.store(router);

        let removed = db.remove_expired_leases(2000);
        assert_eq!(removed, 1);
        assert!(db.lookup(&live_hash).is_some());
        assert!(db.lookup(&dead_hash).is_none());
        assert_eq!(db.record_count(), 2);
    }

    #[test]
    fn test_remove() {
        let db = local_db();
        let record = create_router_record();
        let hash = record.hash();
        db.store(record);

        assert!(db.remove(&hash).is_some());
        assert!(db.lookup(&hash).is_none());
        assert!(db.remove(&hash).is_none());
    }
}
