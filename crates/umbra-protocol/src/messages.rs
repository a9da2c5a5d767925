//! Typed message payloads
//!
//! These are the inner messages carried by an [`Envelope`](crate::Envelope)
//! whose contents are plain hashes and integers. Messages that carry signed
//! records or encrypted tunnel-build material live next to those types in
//! their own crates; all payloads share the bincode encoding helpers defined
//! here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::types::{RecordHash, TunnelId};

/// Serialize a message payload for an envelope
pub fn to_payload<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
}

/// Deserialize a message payload from an envelope
pub fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
}

/// Where the response to a lookup should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyPath {
    /// Straight back to the requesting router
    Direct,
    /// Through the named return tunnel
    Tunnel(TunnelId),
}

/// Request for a record by hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseLookup {
    /// Hash being resolved
    pub key: RecordHash,

    /// Identity hash of the requesting router
    pub from: RecordHash,

    /// How the response should travel
    pub reply: ReplyPath,
}

/// Closest-peer hashes returned when a lookup misses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSearchReply {
    /// Hash that was looked up
    pub key: RecordHash,

    /// Identity hash of the responding router
    pub from: RecordHash,

    /// Hashes of the closest known routers, nearest first
    pub peer_hashes: Vec<RecordHash>,
}

/// Acknowledgment of a store that carried a nonzero reply token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// The acknowledged token
    pub msg_id: u32,

    /// Epoch milliseconds at the acknowledging router
    pub timestamp: i64,
}

/// Opaque layered payload traversing an established tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelData {
    /// Receive tunnel id at the processing hop
    pub tunnel_id: TunnelId,

    /// Layer-encrypted payload
    pub data: Vec<u8>,
}
