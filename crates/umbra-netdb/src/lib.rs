//! Umbra network database
//!
//! A Kademlia-style record store holding signed peer records:
//! - Published router identities with their reachable address
//! - Lease sets mapping destinations to inbound tunnel gateways
//!
//! Records are stored in buckets keyed by XOR distance from the local
//! router's identity hash, and resolved by exact hash or by k-nearest
//! queries.

pub mod bucket;
pub mod error;
pub mod netdb;
pub mod records;

pub use bucket::Bucket;
pub use error::{NetDbError, Result};
pub use netdb::NetDb;
pub use records::{DatabaseStore, Lease, LeaseSet, Record, RecordType, RouterAddress, RouterInfo};

/// Number of distance buckets: indices 0 through 256 inclusive
pub const BUCKET_COUNT: usize = 257;

#[cfg(test)]
mod tests {
    #[test]
    fn test_bucket_count_covers_metric_range() {
        assert_eq!(super::BUCKET_COUNT, umbra_protocol::MAX_BUCKET + 1);
    }
}
