//! Tunnel-build records and the onion construction
//!
//! The originator creates one record per hop. Hybrid encryption seals the
//! identity-revealing fields (hop prefix, reply key, reply IV) individually
//! to the hop's asymmetric key and encrypts the remaining instructions as a
//! single AES-GCM blob under the reply key. On top of that, the record body
//! gets one onion layer per preceding hop, so every hop peels exactly one
//! layer from the records still in flight and finds its own record fully
//! unwrapped on arrival. A record is decrypted exactly once, by the hop it
//! addresses, then discarded.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use umbra_crypto::{aead, sealed, AeadIv, AeadKey, EncryptionPublicKey, EncryptionSecretKey};
use umbra_protocol::{RecordHash, TunnelId, PEER_PREFIX_SIZE};

use crate::error::{Result, TunnelError};

/// Get current timestamp in epoch milliseconds
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Role a hop plays in the tunnel it is being asked to join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopRole {
    /// Entry point: accepts injected data, knows the next hop
    Gateway,
    /// Mid-path relay: knows the next hop only
    Participant,
    /// Exit: delivers locally and knows the reply router and tunnel
    Endpoint,
}

/// Plaintext per-hop build instructions
///
/// Exists in this form only at the originator and, briefly, at the addressed
/// hop after decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Identity prefix of the addressed hop
    pub to_peer: [u8; PEER_PREFIX_SIZE],

    /// Tunnel id the hop will answer to
    pub receive_tunnel: TunnelId,

    /// Identity hash of the addressed hop
    pub our_ident: RecordHash,

    /// Tunnel id at the following hop (reply tunnel for the endpoint)
    pub next_tunnel: TunnelId,

    /// Identity hash of the following hop (reply router for the endpoint)
    pub next_ident: RecordHash,

    /// Key this hop peels data layers with
    pub layer_key: AeadKey,

    /// Key layer IVs are derived from
    pub iv_key: AeadKey,

    /// Key the hop encrypts its build reply with
    pub reply_key: AeadKey,

    /// IV paired with the reply key
    pub reply_iv: AeadIv,

    /// When the originator created the request (epoch milliseconds)
    pub request_time: i64,

    /// Message id the build reply must carry
    pub send_msg_id: u32,

    /// This hop's role
    pub role: HopRole,

    /// Ordered identity hashes of the full path
    pub hop_ids: Vec<RecordHash>,

    /// Whether the originator expects a build reply
    pub reply_requested: bool,
}

/// The bulk-encrypted portion of a record: everything except the three
/// individually sealed fields
#[derive(Serialize, Deserialize)]
struct RecordBody {
    receive_tunnel: TunnelId,
    our_ident: RecordHash,
    next_tunnel: TunnelId,
    next_ident: RecordHash,
    layer_key: AeadKey,
    iv_key: AeadKey,
    request_time: i64,
    send_msg_id: u32,
    role: HopRole,
    hop_ids: Vec<RecordHash>,
    reply_requested: bool,
}

/// Derive the per-record layer IV from a hop's IV key and the record's
/// addressing prefix
///
/// Both the originator (wrapping) and an intermediate hop (peeling) can
/// compute it: the prefix stays outside the layered body.
fn layer_iv(iv_key: &AeadKey, to_peer: &[u8; PEER_PREFIX_SIZE]) -> AeadIv {
    let mut hasher = Sha256::new();
    hasher.update(iv_key.as_bytes());
    hasher.update(to_peer);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&digest[..12]);
    AeadIv(bytes)
}

/// Derive the IV for a hop's encrypted build reply
///
/// The reply reuses the hop's reply key; a distinct derived IV keeps it from
/// colliding with the request blob encrypted under the same key.
fn status_iv(reply_iv: &AeadIv) -> AeadIv {
    let mut hasher = Sha256::new();
    hasher.update(reply_iv.as_bytes());
    hasher.update([0x01u8]);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&digest[..12]);
    AeadIv(bytes)
}

impl BuildRecord {
    /// Hybrid-encrypt this record to the addressed hop
    ///
    /// The hop prefix, reply key and reply IV are sealed individually to the
    /// hop's asymmetric key; every other field goes into one AES-GCM blob
    /// under the reply key. Sealing supplies fresh randomness, so identical
    /// plaintexts never produce related ciphertexts.
    pub fn hybrid_encrypt(&self, peer_key: &EncryptionPublicKey) -> Result<EncryptedBuildRecord> {
        let body = RecordBody {
            receive_tunnel: self.receive_tunnel,
            our_ident: self.our_ident,
            next_tunnel: self.next_tunnel,
            next_ident: self.next_ident,
            layer_key: self.layer_key,
            iv_key: self.iv_key,
            request_time: self.request_time,
            send_msg_id: self.send_msg_id,
            role: self.role,
            hop_ids: self.hop_ids.clone(),
            reply_requested: self.reply_requested,
        };
        let serialized =
            bincode::serialize(&body).map_err(|e| TunnelError::Serialization(e.to_string()))?;
        let enc_data = aead::encrypt(&self.reply_key, &self.reply_iv, &serialized)?;

        Ok(EncryptedBuildRecord {
            to_peer: self.to_peer,
            to_peer_enc: sealed::seal(peer_key, &self.to_peer),
            reply_key_enc: sealed::seal(peer_key, self.reply_key.as_bytes()),
            reply_iv_enc: sealed::seal(peer_key, self.reply_iv.as_bytes()),
            enc_data,
        })
    }
}

/// A per-hop record as it travels: three sealed blobs, one symmetric blob
/// and the plaintext addressing prefix the aggregate is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBuildRecord {
    /// Addressing prefix (map key of the aggregate)
    pub to_peer: [u8; PEER_PREFIX_SIZE],

    /// Sealed copy of the prefix, decryptable only by the addressed hop
    pub to_peer_enc: Vec<u8>,

    /// Sealed reply key
    pub reply_key_enc: Vec<u8>,

    /// Sealed reply IV
    pub reply_iv_enc: Vec<u8>,

    /// Bulk instructions, possibly still wearing onion layers
    pub enc_data: Vec<u8>,
}

impl EncryptedBuildRecord {
    /// Invert [`BuildRecord::hybrid_encrypt`] with the hop's key pair
    ///
    /// An authentication failure on the bulk blob is a hard failure of this
    /// record; a sealed prefix that does not match the plaintext one means
    /// the record was addressed to someone else.
    pub fn hybrid_decrypt(
        &self,
        recipient: &EncryptionPublicKey,
        secret: &EncryptionSecretKey,
    ) -> Result<BuildRecord> {
        let to_peer = sealed::open(recipient, secret, &self.to_peer_enc)?;
        if to_peer.as_slice() != self.to_peer {
            return Err(TunnelError::Misaddressed);
        }

        let reply_key = AeadKey::from_slice(&sealed::open(recipient, secret, &self.reply_key_enc)?)?;
        let reply_iv = AeadIv::from_slice(&sealed::open(recipient, secret, &self.reply_iv_enc)?)?;

        let serialized = aead::decrypt(&reply_key, &reply_iv, &self.enc_data)?;
        let body: RecordBody = bincode::deserialize(&serialized)
            .map_err(|e| TunnelError::Serialization(e.to_string()))?;

        Ok(BuildRecord {
            to_peer: self.to_peer,
            receive_tunnel: body.receive_tunnel,
            our_ident: body.our_ident,
            next_tunnel: body.next_tunnel,
            next_ident: body.next_ident,
            layer_key: body.layer_key,
            iv_key: body.iv_key,
            reply_key,
            reply_iv,
            request_time: body.request_time,
            send_msg_id: body.send_msg_id,
            role: body.role,
            hop_ids: body.hop_ids,
            reply_requested: body.reply_requested,
        })
    }

    /// Add one onion layer over the record body
    pub fn layered_encrypt(&mut self, layer_key: &AeadKey, iv_key: &AeadKey) -> Result<()> {
        let iv = layer_iv(iv_key, &self.to_peer);
        self.enc_data = aead::encrypt(layer_key, &iv, &self.enc_data)?;
        Ok(())
    }

    /// Remove one onion layer from the record body
    pub fn layered_decrypt(&mut self, layer_key: &AeadKey, iv_key: &AeadKey) -> Result<()> {
        let iv = layer_iv(iv_key, &self.to_peer);
        self.enc_data = aead::decrypt(layer_key, &iv, &self.enc_data)?;
        Ok(())
    }
}

/// A hop's encrypted answer to a build request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReplyRecord {
    /// Prefix of the hop that wrote this reply
    pub to_peer: [u8; PEER_PREFIX_SIZE],

    /// Status encrypted under the hop's reply key
    pub enc_data: Vec<u8>,
}

/// Whether a hop agreed to join the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildReplyStatus {
    Accept,
    Reject,
}

impl BuildReplyRecord {
    /// Encrypt a status under the hop's reply key
    pub fn encrypt_status(
        to_peer: [u8; PEER_PREFIX_SIZE],
        reply_key: &AeadKey,
        reply_iv: &AeadIv,
        status: BuildReplyStatus,
    ) -> Result<Self> {
        let serialized =
            bincode::serialize(&status).map_err(|e| TunnelError::Serialization(e.to_string()))?;
        let enc_data = aead::encrypt(reply_key, &status_iv(reply_iv), &serialized)?;
        Ok(BuildReplyRecord { to_peer, enc_data })
    }

    /// Decrypt a status with the originator's stored reply key
    pub fn decrypt_status(&self, reply_key: &AeadKey, reply_iv: &AeadIv) -> Result<BuildReplyStatus> {
        let serialized = aead::decrypt(reply_key, &status_iv(reply_iv), &self.enc_data)?;
        bincode::deserialize(&serialized).map_err(|e| TunnelError::Serialization(e.to_string()))
    }
}

/// One per-hop record for every hop of the path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelBuild {
    /// Records still awaiting their addressed hop
    pub records: Vec<EncryptedBuildRecord>,

    /// Encrypted statuses from hops already traversed
    pub replies: Vec<BuildReplyRecord>,
}

impl TunnelBuild {
    /// Look a record up by the addressed hop's identity prefix
    pub fn record_for(&self, prefix: &[u8; PEER_PREFIX_SIZE]) -> Option<&EncryptedBuildRecord> {
        self.records.iter().find(|record| &record.to_peer == prefix)
    }

    /// Remove and return the record addressed to the given prefix
    pub fn take_record(&mut self, prefix: &[u8; PEER_PREFIX_SIZE]) -> Option<EncryptedBuildRecord> {
        let idx = self
            .records
            .iter()
            .position(|record| &record.to_peer == prefix)?;
        Some(self.records.remove(idx))
    }
}

/// Per-hop build statuses returned to the originator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelBuildReply {
    /// Correlates the reply with the pending build
    pub send_msg_id: u32,

    /// One encrypted status per hop
    pub records: Vec<BuildReplyRecord>,
}

impl TunnelBuildReply {
    /// Bulk-decrypt every hop's status with the originator's stored keys
    pub fn decrypt_aes(&self, hops: &[HopKeys]) -> Result<Vec<BuildReplyStatus>> {
        let mut statuses = Vec::with_capacity(hops.len());
        for hop in hops {
            let record = self
                .records
                .iter()
                .find(|record| record.to_peer == hop.to_peer)
                .ok_or(TunnelError::RecordNotFound)?;
            statuses.push(record.decrypt_status(&hop.reply_key, &hop.reply_iv)?);
        }
        Ok(statuses)
    }
}

/// What the originator knows about one hop of a path it wants to build
#[derive(Debug, Clone)]
pub struct HopInfo {
    /// The hop's identity hash
    pub ident: RecordHash,

    /// The hop's asymmetric encryption key
    pub encryption_key: EncryptionPublicKey,
}

/// Key material the originator keeps per hop while a build is in flight
#[derive(Debug, Clone)]
pub struct HopKeys {
    pub ident: RecordHash,
    pub to_peer: [u8; PEER_PREFIX_SIZE],
    pub receive_tunnel: TunnelId,
    pub layer_key: AeadKey,
    pub iv_key: AeadKey,
    pub reply_key: AeadKey,
    pub reply_iv: AeadIv,
}

/// Originator-side state for a build awaiting its reply
#[derive(Debug, Clone)]
pub struct PendingBuild {
    /// Message id the reply must carry
    pub send_msg_id: u32,

    /// When the request was created (epoch milliseconds)
    pub created: i64,

    /// Per-hop keys in path order, gateway first
    pub hops: Vec<HopKeys>,
}

/// Create a build request for the given path
///
/// The first hop becomes the gateway, the last the endpoint (a single-hop
/// path is endpoint only). The endpoint's next hop fields carry the
/// originator's identity and reply tunnel. Record i is layered once per
/// preceding hop, outermost layer belonging to the gateway.
pub fn create_build(
    originator: RecordHash,
    reply_tunnel: TunnelId,
    path: &[HopInfo],
) -> Result<(TunnelBuild, PendingBuild)> {
    if path.is_empty() {
        return Err(TunnelError::EmptyPath);
    }

    let send_msg_id: u32 = rand::random();
    let request_time = now_ms();
    let hop_ids: Vec<RecordHash> = path.iter().map(|hop| hop.ident).collect();
    let receive_tunnels: Vec<TunnelId> = path.iter().map(|_| TunnelId::random()).collect();

    let mut hops = Vec::with_capacity(path.len());
    let mut plain_records = Vec::with_capacity(path.len());

    for (i, hop) in path.iter().enumerate() {
        let last = i == path.len() - 1;
        let role = if last {
            HopRole::Endpoint
        } else if i == 0 {
            HopRole::Gateway
        } else {
            HopRole::Participant
        };

        let (next_ident, next_tunnel) = if last {
            (originator, reply_tunnel)
        } else {
            (path[i + 1].ident, receive_tunnels[i + 1])
        };

        let record = BuildRecord {
            to_peer: hop.ident.prefix(),
            receive_tunnel: receive_tunnels[i],
            our_ident: hop.ident,
            next_tunnel,
            next_ident,
            layer_key: AeadKey::generate(),
            iv_key: AeadKey::generate(),
            reply_key: AeadKey::generate(),
            reply_iv: AeadIv::generate(),
            request_time,
            send_msg_id,
            role,
            hop_ids: hop_ids.clone(),
            reply_requested: true,
        };

        hops.push(HopKeys {
            ident: hop.ident,
            to_peer: record.to_peer,
            receive_tunnel: record.receive_tunnel,
            layer_key: record.layer_key,
            iv_key: record.iv_key,
            reply_key: record.reply_key,
            reply_iv: record.reply_iv,
        });
        plain_records.push(record);
    }

    let mut records = Vec::with_capacity(path.len());
    for (i, (record, hop)) in plain_records.iter().zip(path.iter()).enumerate() {
        let mut encrypted = record.hybrid_encrypt(&hop.encryption_key)?;
        // One layer per preceding hop; the gateway's layer goes on last and
        // comes off first.
        for j in (0..i).rev() {
            encrypted.layered_encrypt(&plain_records[j].layer_key, &plain_records[j].iv_key)?;
        }
        records.push(encrypted);
    }

    let build = TunnelBuild {
        records,
        replies: Vec::new(),
    };
    let pending = PendingBuild {
        send_msg_id,
        created: request_time,
        hops,
    };

    Ok((build, pending))
}
