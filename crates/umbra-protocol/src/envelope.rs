//! Message envelope for wire transmission
//!
//! Every datagram exchanged between routers carries exactly one envelope:
//!
//! - Message Type (1 byte): type of the inner message
//! - Message ID (4 bytes): unique per sender (big-endian)
//! - Expiration (8 bytes): epoch milliseconds (big-endian, signed)
//! - Checksum (3 bytes): first 3 bytes of SHA-256 over the payload
//! - Payload Length (4 bytes): length of payload (big-endian)
//! - Payload (variable): serialized inner message
//!
//! Receivers recompute the checksum and compare it to the header before the
//! payload is interpreted, and drop expired envelopes without replying.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// Fixed envelope header size: 1 + 4 + 8 + 3 + 4 = 20 bytes
pub const ENVELOPE_HEADER_SIZE: usize = 20;

/// Truncated checksum size
pub const CHECKSUM_SIZE: usize = 3;

/// Maximum payload size (1 MB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Message type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Insert a record into the network database (0x01)
    DatabaseStore = 1,
    /// Look a record up by hash (0x02)
    DatabaseLookup = 2,
    /// Closest-peer hashes returned for a failed lookup (0x03)
    DatabaseSearchReply = 3,
    /// Acknowledgment of a store carrying a reply token (0x0A)
    DeliveryStatus = 10,
    /// Layer-encrypted payload traversing an established tunnel (0x12)
    TunnelData = 18,
    /// Per-hop encrypted tunnel construction request (0x15)
    TunnelBuild = 21,
    /// Per-hop build statuses returned to the originator (0x16)
    TunnelBuildReply = 22,
}

impl MessageType {
    /// Create from u8
    ///
    /// An unrecognized code is a protocol defect, not a tolerated case.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::DatabaseStore),
            2 => Ok(MessageType::DatabaseLookup),
            3 => Ok(MessageType::DatabaseSearchReply),
            10 => Ok(MessageType::DeliveryStatus),
            18 => Ok(MessageType::TunnelData),
            21 => Ok(MessageType::TunnelBuild),
            22 => Ok(MessageType::TunnelBuildReply),
            _ => Err(ProtocolError::InvalidMessageType(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Compute the truncated payload checksum: first 3 bytes of SHA-256
pub fn payload_checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha256::digest(payload);
    let mut checksum = [0u8; CHECKSUM_SIZE];
    checksum.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    checksum
}

/// A complete envelope with header fields and serialized payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type
    pub msg_type: MessageType,

    /// Unique message identifier (per sender)
    pub msg_id: u32,

    /// Expiration as epoch milliseconds
    pub expiration: i64,

    /// Truncated SHA-256 of the payload
    pub checksum: [u8; CHECKSUM_SIZE],

    /// Serialized inner message
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create a new envelope, computing the payload checksum
    pub fn new(msg_type: MessageType, msg_id: u32, expiration: i64, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let checksum = payload_checksum(&payload);

        Ok(Envelope {
            msg_type,
            msg_id,
            expiration,
            checksum,
            payload,
        })
    }

    /// Recompute the checksum and compare it to the header
    pub fn verify_checksum(&self) -> bool {
        payload_checksum(&self.payload) == self.checksum
    }

    /// Check whether the envelope has expired at the given time (epoch ms)
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expiration
    }

    /// Serialize the envelope to bytes for transmission
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENVELOPE_HEADER_SIZE + self.payload.len());

        // Message Type (1 byte)
        bytes.push(self.msg_type.to_u8());

        // Message ID (4 bytes, big-endian)
        bytes.extend_from_slice(&self.msg_id.to_be_bytes());

        // Expiration (8 bytes, big-endian)
        bytes.extend_from_slice(&self.expiration.to_be_bytes());

        // Checksum (3 bytes)
        bytes.extend_from_slice(&self.checksum);

        // Payload Length (4 bytes, big-endian)
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());

        // Payload
        bytes.extend_from_slice(&self.payload);

        bytes
    }

    /// Deserialize an envelope from bytes
    ///
    /// Rejects malformed input at parse time; the payload is never partially
    /// populated.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENVELOPE_HEADER_SIZE {
            return Err(ProtocolError::InvalidEnvelopeFormat);
        }

        let mut offset = 0;

        // Message Type (1 byte)
        let msg_type = MessageType::from_u8(bytes[offset])?;
        offset += 1;

        // Message ID (4 bytes, big-endian)
        let msg_id = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        offset += 4;

        // Expiration (8 bytes, big-endian)
        let mut expiration_bytes = [0u8; 8];
        expiration_bytes.copy_from_slice(&bytes[offset..offset + 8]);
        let expiration = i64::from_be_bytes(expiration_bytes);
        offset += 8;

        // Checksum (3 bytes)
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&bytes[offset..offset + CHECKSUM_SIZE]);
        offset += CHECKSUM_SIZE;

        // Payload Length (4 bytes, big-endian)
        let payload_length = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        offset += 4;

        if payload_length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if bytes.len() != offset + payload_length {
            return Err(ProtocolError::InvalidEnvelopeFormat);
        }

        let payload = bytes[offset..offset + payload_length].to_vec();

        Ok(Envelope {
            msg_type,
            msg_id,
            expiration,
            checksum,
            payload,
        })
    }

    /// Total encoded size of the envelope
    pub fn size(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.payload.len()
    }
}
