//! Core protocol types
//!
//! A `RecordHash` identifies every entity in the network database: routers,
//! destinations and the records they publish. Closeness between hashes is
//! measured with the Kademlia-style XOR metric, expressed as the bit position
//! of the most significant differing bit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Size of a record hash in bytes (SHA-256 output)
pub const HASH_SIZE: usize = 32;

/// Largest valid bucket index: hashes can differ in at most 256 bit positions
pub const MAX_BUCKET: usize = 256;

/// Length of the truncated identity prefix used to address tunnel-build
/// records to a specific hop
pub const PEER_PREFIX_SIZE: usize = 16;

/// A 32-byte identifier derived from key material via SHA-256
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RecordHash([u8; HASH_SIZE]);

impl RecordHash {
    /// Create a RecordHash from a byte array
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        RecordHash(bytes)
    }

    /// Create a RecordHash from a slice, failing on wrong length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_SIZE {
            return Err(ProtocolError::InvalidHash);
        }
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(bytes);
        Ok(RecordHash(arr))
    }

    /// Get the bytes of this hash
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// First 16 bytes of the hash, used to address a hop without naming it in
    /// full on the wire
    pub fn prefix(&self) -> [u8; PEER_PREFIX_SIZE] {
        let mut prefix = [0u8; PEER_PREFIX_SIZE];
        prefix.copy_from_slice(&self.0[..PEER_PREFIX_SIZE]);
        prefix
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Bitwise XOR of two hashes
    pub fn xor(&self, other: &RecordHash) -> [u8; HASH_SIZE] {
        let mut result = [0u8; HASH_SIZE];
        for (i, item) in result.iter_mut().enumerate() {
            *item = self.0[i] ^ other.0[i];
        }
        result
    }

    /// Number of leading zero bits in the XOR of two hashes (0-256)
    pub fn leading_zero_bits(&self, other: &RecordHash) -> usize {
        let xored = self.xor(other);
        let mut zeros = 0;
        for byte in xored.iter() {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros() as usize;
                break;
            }
        }
        zeros
    }

    /// XOR closeness bucket between two hashes: `256 - leading_zero_bits`.
    ///
    /// The result is the bit position of the most significant differing bit,
    /// counted from the most significant end. Identical hashes land in bucket
    /// 0, hashes differing in their first bit in bucket 256.
    pub fn distance_bucket(&self, other: &RecordHash) -> usize {
        MAX_BUCKET - self.leading_zero_bits(other)
    }
}

impl fmt::Debug for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordHash({})", self.to_hex())
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Identifier of a tunnel at a single hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct TunnelId(pub u32);

impl TunnelId {
    /// Generate a fresh random tunnel id
    pub fn random() -> Self {
        TunnelId(rand::random())
    }

    /// Get raw value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_round_trip() {
        let hash = RecordHash::from_bytes([42u8; HASH_SIZE]);

        let hex = hash.to_hex();
        let parsed = RecordHash::from_hex(&hex).unwrap();

        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(RecordHash::from_slice(&[0u8; 31]).is_err());
        assert!(RecordHash::from_slice(&[0u8; 33]).is_err());
        assert!(RecordHash::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_distance_to_self_is_closest() {
        // Identical hashes have 256 leading zero bits in their XOR, which is
        // maximal closeness: bucket 0.
        let hash = RecordHash::from_bytes([0xAB; HASH_SIZE]);
        assert_eq!(hash.leading_zero_bits(&hash), 256);
        assert_eq!(hash.distance_bucket(&hash), 0);
    }

    #[test]
    fn test_distance_symmetry() {
        let a = RecordHash::from_bytes([0x0F; HASH_SIZE]);
        let b = RecordHash::from_bytes([0xF0; HASH_SIZE]);

        assert_eq!(a.distance_bucket(&b), b.distance_bucket(&a));
        assert_eq!(a.xor(&b), b.xor(&a));
    }

    #[test]
    fn test_distance_range() {
        let a = RecordHash::from_bytes([0x00; HASH_SIZE]);
        let b = RecordHash::from_bytes([0xFF; HASH_SIZE]);
        let c = {
            let mut bytes = [0u8; HASH_SIZE];
            bytes[31] = 0x01;
            RecordHash::from_bytes(bytes)
        };

        // First bit differs: bucket 256
        assert_eq!(a.distance_bucket(&b), 256);
        // Only the very last bit differs: bucket 1
        assert_eq!(a.distance_bucket(&c), 1);
        assert!(a.distance_bucket(&b) <= MAX_BUCKET);
    }

    #[test]
    fn test_distance_most_significant_differing_bit() {
        let a = RecordHash::from_bytes([0u8; HASH_SIZE]);

        // Differ in bit 0 of byte 1 (the 9th bit): 8 leading zeros
        let mut bytes = [0u8; HASH_SIZE];
        bytes[1] = 0b1000_0000;
        let b = RecordHash::from_bytes(bytes);

        assert_eq!(a.leading_zero_bits(&b), 8);
        assert_eq!(a.distance_bucket(&b), 248);
    }

    #[test]
    fn test_prefix() {
        let mut bytes = [0u8; HASH_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let hash = RecordHash::from_bytes(bytes);

        let prefix = hash.prefix();
        assert_eq!(prefix.len(), PEER_PREFIX_SIZE);
        assert_eq!(&prefix[..], &bytes[..PEER_PREFIX_SIZE]);
    }

    #[test]
    fn test_tunnel_id_random_distinct() {
        // Collisions across a handful of draws would point at a broken RNG
        let ids: std::collections::HashSet<u32> =
            (0..32).map(|_| TunnelId::random().as_u32()).collect();
        assert!(ids.len() > 1);
    }
}
