//! Published record entities
//!
//! The database holds exactly two kinds of record. A `RouterInfo` is a
//! signed, published router identity plus the address it can be reached at;
//! it is created when a router boots, is immutable after signing, and is
//! republished on restart. A `LeaseSet` is a signed mapping from a
//! destination to the inbound tunnel gateways currently reachable for it;
//! it expires and is refreshed as tunnels are rebuilt.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use umbra_crypto::identity::verify_signature;
use umbra_crypto::{
    Destination, DestinationIdentity, EncryptionPublicKey, RouterId, RouterIdentity, Signature,
    SigningPublicKey,
};
use umbra_protocol::{RecordHash, TunnelId};

/// Get current timestamp in epoch milliseconds
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Network address a router listens on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterAddress {
    pub host: String,
    pub port: u16,
}

impl RouterAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        RouterAddress {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for RouterAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A signed, published router identity and address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInfo {
    /// The router's public identity
    pub router_id: RouterId,

    /// Publication time (epoch milliseconds)
    pub published: i64,

    /// Reachable address
    pub address: RouterAddress,

    /// Signature by the router's own signing key over the canonical bytes
    pub signature: Signature,
}

impl RouterInfo {
    /// Create and sign a RouterInfo for the given identity
    pub fn new(identity: &RouterIdentity, address: RouterAddress) -> Self {
        Self::new_at(identity, address, now_ms())
    }

    /// Create and sign a RouterInfo with an explicit publication time
    pub fn new_at(identity: &RouterIdentity, address: RouterAddress, published: i64) -> Self {
        let router_id = identity.router_id().clone();
        let canonical = Self::canonical_bytes(&router_id, published, &address);
        let signature = identity.sign(&canonical);

        RouterInfo {
            router_id,
            published,
            address,
            signature,
        }
    }

    fn canonical_bytes(router_id: &RouterId, published: i64, address: &RouterAddress) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&router_id.encryption_key.0);
        bytes.extend_from_slice(&router_id.signing_key.0);
        bytes.extend_from_slice(&published.to_be_bytes());
        bytes.extend_from_slice(address.host.as_bytes());
        bytes.extend_from_slice(&address.port.to_be_bytes());
        bytes
    }

    /// Database key: SHA-256 over key material, publication time and address
    pub fn hash(&self) -> RecordHash {
        let canonical = Self::canonical_bytes(&self.router_id, self.published, &self.address);
        let digest = Sha256::digest(&canonical);

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        RecordHash::from_bytes(bytes)
    }

    /// Check the signature against the router's own signing key
    pub fn verify_signature(&self) -> bool {
        let canonical = Self::canonical_bytes(&self.router_id, self.published, &self.address);
        verify_signature(&self.router_id.signing_key, &canonical, &self.signature)
    }
}

/// One reachable inbound tunnel endpoint for a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Identity hash of the tunnel's gateway router
    pub gateway: RecordHash,

    /// Tunnel id at the gateway
    pub tunnel: TunnelId,

    /// Expiration (epoch milliseconds)
    pub expiration: i64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expiration
    }
}

/// A signed mapping from a destination to its reachable tunnel endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSet {
    /// The owning destination
    pub destination: Destination,

    /// Key payloads for this destination are sealed to
    pub encryption_key: EncryptionPublicKey,

    /// Optional key authorized to revoke this lease set
    pub revocation_key: Option<SigningPublicKey>,

    /// Currently reachable inbound tunnel endpoints
    pub leases: Vec<Lease>,

    /// Signature by the destination's signing key over the canonical bytes
    pub signature: Signature,
}

impl LeaseSet {
    /// Create and sign a LeaseSet for the given destination
    pub fn new(
        identity: &DestinationIdentity,
        encryption_key: EncryptionPublicKey,
        revocation_key: Option<SigningPublicKey>,
        leases: Vec<Lease>,
    ) -> Self {
        let destination = identity.destination().clone();
        let canonical =
            Self::canonical_bytes(&destination, &encryption_key, &revocation_key, &leases);
        let signature = identity.sign(&canonical);

        LeaseSet {
            destination,
            encryption_key,
            revocation_key,
            leases,
            signature,
        }
    }

    fn canonical_bytes(
        destination: &Destination,
        encryption_key: &EncryptionPublicKey,
        revocation_key: &Option<SigningPublicKey>,
        leases: &[Lease],
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&destination.encryption_key.0);
        bytes.extend_from_slice(&destination.signing_key.0);
        bytes.extend_from_slice(&encryption_key.0);
        if let Some(key) = revocation_key {
            bytes.extend_from_slice(&key.0);
        }
        for lease in leases {
            bytes.extend_from_slice(lease.gateway.as_bytes());
            bytes.extend_from_slice(&lease.tunnel.as_u32().to_be_bytes());
            bytes.extend_from_slice(&lease.expiration.to_be_bytes());
        }
        bytes
    }

    /// Database key: the owning destination's identity hash
    pub fn hash(&self) -> RecordHash {
        self.destination.hash()
    }

    /// Check the signature against the destination's signing key
    pub fn verify_signature(&self) -> bool {
        let canonical = Self::canonical_bytes(
            &self.destination,
            &self.encryption_key,
            &self.revocation_key,
            &self.leases,
        );
        verify_signature(&self.destination.signing_key, &canonical, &self.signature)
    }

    /// A lease set with no live lease has no reachable endpoint left
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.leases.iter().all(|lease| lease.is_expired(now_ms))
    }
}

/// Discriminant for the two record variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    RouterInfo,
    LeaseSet,
}

/// A record held by the network database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    RouterInfo(RouterInfo),
    LeaseSet(LeaseSet),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::RouterInfo(_) => RecordType::RouterInfo,
            Record::LeaseSet(_) => RecordType::LeaseSet,
        }
    }

    /// Database key of this record
    pub fn hash(&self) -> RecordHash {
        match self {
            Record::RouterInfo(info) => info.hash(),
            Record::LeaseSet(set) => set.hash(),
        }
    }

    /// Check the record's signature against its embedded public key
    pub fn verify_signature(&self) -> bool {
        match self {
            Record::RouterInfo(info) => info.verify_signature(),
            Record::LeaseSet(set) => set.verify_signature(),
        }
    }

    /// Borrow the RouterInfo variant, if that is what this record is
    pub fn as_router_info(&self) -> Option<&RouterInfo> {
        match self {
            Record::RouterInfo(info) => Some(info),
            Record::LeaseSet(_) => None,
        }
    }
}

/// Request to insert a record, optionally acknowledged and flooded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStore {
    /// Hash of the carried record
    pub key: RecordHash,

    /// The record itself
    pub record: Record,

    /// Nonzero when the sender wants a DeliveryStatus acknowledgment
    pub reply_token: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_router_info() -> (RouterIdentity, RouterInfo) {
        let identity = RouterIdentity::generate().unwrap();
        let info = RouterInfo::new_at(&identity, RouterAddress::new("10.0.0.1", 4100), 1_704_067_200_000);
        (identity, info)
    }

    #[test]
    fn test_router_info_signature_valid() {
        let (_, info) = test_router_info();
        assert!(info.verify_signature());
    }

    #[test]
    fn test_router_info_tamper_breaks_signature() {
        let (_, info) = test_router_info();

        let mut tampered = info.clone();
        tampered.address.port = 4101;
        assert!(!tampered.verify_signature());

        let mut tampered = info;
        tampered.published += 1;
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn test_router_info_hash_covers_timestamp_and_address() {
        let identity = RouterIdentity::generate().unwrap();
        let a = RouterInfo::new_at(&identity, RouterAddress::new("10.0.0.1", 4100), 1000);
        let b = RouterInfo::new_at(&identity, RouterAddress::new("10.0.0.1", 4100), 2000);
        let c = RouterInfo::new_at(&identity, RouterAddress::new("10.0.0.2", 4100), 1000);

        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_router_info_serde_round_trip() {
        let (_, info) = test_router_info();

        let bytes = bincode::serialize(&info).unwrap();
        let decoded: RouterInfo = bincode::deserialize(&bytes).unwrap();

        assert_eq!(info, decoded);
        assert_eq!(info.hash(), decoded.hash());
        assert!(decoded.verify_signature());
    }

    fn test_lease_set(leases: Vec<Lease>) -> LeaseSet {
        let identity = DestinationIdentity::generate().unwrap();
        let encryption_key = identity.destination().encryption_key;
        LeaseSet::new(&identity, encryption_key, None, leases)
    }

    #[test]
    fn test_lease_set_signature_valid() {
        let set = test_lease_set(vec![Lease {
            gateway: RecordHash::from_bytes([7u8; 32]),
            tunnel: TunnelId(42),
            expiration: 2_000_000_000_000,
        }]);
        assert!(set.verify_signature());
    }

    #[test]
    fn test_lease_set_tamper_breaks_signature() {
        let mut set = test_lease_set(vec![Lease {
            gateway: RecordHash::from_bytes([7u8; 32]),
            tunnel: TunnelId(42),
            expiration: 2_000_000_000_000,
        }]);

        set.leases[0].tunnel = TunnelId(43);
        assert!(!set.verify_signature());
    }

    #[test]
    fn test_lease_set_hash_is_destination_hash() {
        let set = test_lease_set(Vec::new());
        assert_eq!(set.hash(), set.destination.hash());
    }

    #[test]
    fn test_lease_expiry() {
        let lease = Lease {
            gateway: RecordHash::from_bytes([1u8; 32]),
            tunnel: TunnelId(1),
            expiration: 1000,
        };
        assert!(!lease.is_expired(999));
        assert!(lease.is_expired(1000));

        let set = test_lease_set(vec![
            lease,
            Lease {
                gateway: RecordHash::from_bytes([2u8; 32]),
                tunnel: TunnelId(2),
                expiration: 5000,
            },
        ]);
        // One live lease keeps the set alive
        assert!(!set.is_expired(2000));
        assert!(set.is_expired(5000));
    }

    #[test]
    fn test_empty_lease_set_is_expired() {
        let set = test_lease_set(Vec::new());
        assert!(set.is_expired(0));
    }

    #[test]
    fn test_lease_serde_round_trip() {
        let lease = Lease {
            gateway: RecordHash::from_bytes([9u8; 32]),
            tunnel: TunnelId(17),
            expiration: 1_704_067_200_000,
        };

        let bytes = bincode::serialize(&lease).unwrap();
        let decoded: Lease = bincode::deserialize(&bytes).unwrap();
        assert_eq!(lease, decoded);
    }

    #[test]
    fn test_record_polymorphism() {
        let (_, info) = test_router_info();
        let set = test_lease_set(Vec::new());

        let record = Record::RouterInfo(info.clone());
        assert_eq!(record.record_type(), RecordType::RouterInfo);
        assert_eq!(record.hash(), info.hash());
        assert!(record.verify_signature());
        assert!(record.as_router_info().is_some());

        let record = Record::LeaseSet(set.clone());
        assert_eq!(record.record_type(), RecordType::LeaseSet);
        assert_eq!(record.hash(), set.hash());
        assert!(record.verify_signature());
        assert!(record.as_router_info().is_none());
    }

    #[test]
    fn test_database_store_round_trip() {
        let (_, info) = test_router_info();
        let store = DatabaseStore {
            key: info.hash(),
            record: Record::RouterInfo(info),
            reply_token: 99,
        };

        let payload = umbra_protocol::messages::to_payload(&store).unwrap();
        let decoded: DatabaseStore =
            umbra_protocol::messages::from_payload(&payload).unwrap();
        assert_eq!(store, decoded);
    }
}
