//! Router and destination identities
//!
//! An identity pairs an asymmetric encryption public key with a signing
//! public key. Its hash (SHA-256 over the concatenated key bytes) is the
//! stable identifier used as the network database key. Routers and
//! destinations share the key-pair structure but are distinct types: a
//! destination names an application endpoint, a router a network relay.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sodiumoxide::crypto::box_;
use sodiumoxide::crypto::sign;

use umbra_protocol::RecordHash;

use crate::error::Result;

pub use sodiumoxide::crypto::box_::{
    PublicKey as EncryptionPublicKey, SecretKey as EncryptionSecretKey,
};
pub use sodiumoxide::crypto::sign::ed25519::{
    PublicKey as SigningPublicKey, SecretKey as SigningSecretKey, Signature,
};

fn hash_keys(encryption_key: &EncryptionPublicKey, signing_key: &SigningPublicKey) -> RecordHash {
    let mut hasher = Sha256::new();
    hasher.update(encryption_key.0);
    hasher.update(signing_key.0);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    RecordHash::from_bytes(bytes)
}

/// Public identity of a network relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterId {
    /// Curve25519 key other routers seal envelopes to
    pub encryption_key: EncryptionPublicKey,

    /// Ed25519 key this router signs published records with
    pub signing_key: SigningPublicKey,
}

impl RouterId {
    /// Stable identity hash: SHA-256(encryption key bytes || signing key bytes)
    pub fn hash(&self) -> RecordHash {
        hash_keys(&self.encryption_key, &self.signing_key)
    }
}

/// Public identity of an application endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Curve25519 key clients seal payloads to
    pub encryption_key: EncryptionPublicKey,

    /// Ed25519 key lease sets are signed with
    pub signing_key: SigningPublicKey,
}

impl Destination {
    /// Stable identity hash: SHA-256(encryption key bytes || signing key bytes)
    pub fn hash(&self) -> RecordHash {
        hash_keys(&self.encryption_key, &self.signing_key)
    }
}

/// Full key material for a router, secret halves included
pub struct RouterIdentity {
    router_id: RouterId,
    encryption_secret: EncryptionSecretKey,
    signing_secret: SigningSecretKey,
}

impl RouterIdentity {
    /// Generate a fresh identity
    pub fn generate() -> Result<Self> {
        crate::init()?;

        let (encryption_key, encryption_secret) = box_::gen_keypair();
        let (signing_key, signing_secret) = sign::gen_keypair();

        Ok(RouterIdentity {
            router_id: RouterId {
                encryption_key,
                signing_key,
            },
            encryption_secret,
            signing_secret,
        })
    }

    /// Public half of this identity
    pub fn router_id(&self) -> &RouterId {
        &self.router_id
    }

    /// Identity hash
    pub fn hash(&self) -> RecordHash {
        self.router_id.hash()
    }

    /// Secret key for opening sealed envelopes addressed to this router
    pub fn encryption_secret(&self) -> &EncryptionSecretKey {
        &self.encryption_secret
    }

    /// Sign arbitrary bytes with the router's signing key
    pub fn sign(&self, message: &[u8]) -> Signature {
        sign::sign_detached(message, &self.signing_secret)
    }
}

/// Full key material for a destination, secret halves included
pub struct DestinationIdentity {
    destination: Destination,
    encryption_secret: EncryptionSecretKey,
    signing_secret: SigningSecretKey,
}

impl DestinationIdentity {
    /// Generate a fresh identity
    pub fn generate() -> Result<Self> {
        crate::init()?;

        let (encryption_key, encryption_secret) = box_::gen_keypair();
        let (signing_key, signing_secret) = sign::gen_keypair();

        Ok(DestinationIdentity {
            destination: Destination {
                encryption_key,
                signing_key,
            },
            encryption_secret,
            signing_secret,
        })
    }

    /// Public half of this identity
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Identity hash
    pub fn hash(&self) -> RecordHash {
        self.destination.hash()
    }

    /// Secret key for opening sealed payloads addressed to this destination
    pub fn encryption_secret(&self) -> &EncryptionSecretKey {
        &self.encryption_secret
    }

    /// Sign arbitrary bytes with the destination's signing key
    pub fn sign(&self, message: &[u8]) -> Signature {
        sign::sign_detached(message, &self.signing_secret)
    }
}

/// Verify a detached signature against a signing public key
pub fn verify_signature(key: &SigningPublicKey, message: &[u8], signature: &Signature) -> bool {
    sign::verify_detached(signature, message, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hash_is_stable() {
        let identity = RouterIdentity::generate().unwrap();

        let h1 = identity.hash();
        let h2 = identity.router_id().hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_distinct_identities_distinct_hashes() {
        let a = RouterIdentity::generate().unwrap();
        let b = RouterIdentity::generate().unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_covers_both_keys() {
        let a = RouterIdentity::generate().unwrap();
        let b = RouterIdentity::generate().unwrap();

        // Same signing key, different encryption key: hash must differ
        let mixed = RouterId {
            encryption_key: b.router_id().encryption_key,
            signing_key: a.router_id().signing_key,
        };
        assert_ne!(mixed.hash(), a.hash());
        assert_ne!(mixed.hash(), b.hash());
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = RouterIdentity::generate().unwrap();
        let message = b"published record bytes";

        let signature = identity.sign(message);
        assert!(verify_signature(
            &identity.router_id().signing_key,
            message,
            &signature
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_message() {
        let identity = RouterIdentity::generate().unwrap();
        let signature = identity.sign(b"original");

        assert!(!verify_signature(
            &identity.router_id().signing_key,
            b"tampered",
            &signature
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let identity = RouterIdentity::generate().unwrap();
        let other = RouterIdentity::generate().unwrap();
        let signature = identity.sign(b"message");

        assert!(!verify_signature(
            &other.router_id().signing_key,
            b"message",
            &signature
        ));
    }

    #[test]
    fn test_destination_identity() {
        let identity = DestinationIdentity::generate().unwrap();
        let message = b"lease set bytes";

        let signature = identity.sign(message);
        assert!(verify_signature(
            &identity.destination().signing_key,
            message,
            &signature
        ));
        assert_eq!(identity.hash(), identity.destination().hash());
    }

    #[test]
    fn test_router_id_serde_round_trip() {
        let identity = RouterIdentity::generate().unwrap();
        let router_id = identity.router_id().clone();

        let bytes = bincode::serialize(&router_id).unwrap();
        let decoded: RouterId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(router_id, decoded);
        assert_eq!(router_id.hash(), decoded.hash());
    }
}
