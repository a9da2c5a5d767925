//! Tunnel manager
//!
//! Owns the hops this router participates in, keyed by their receive tunnel
//! id, and the originator's pending builds keyed by the message id their
//! reply must carry.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use umbra_crypto::{EncryptionPublicKey, EncryptionSecretKey};
use umbra_protocol::{RecordHash, TunnelId, PEER_PREFIX_SIZE};

use crate::build::{
    BuildReplyRecord, BuildReplyStatus, HopKeys, HopRole, PendingBuild, TunnelBuild,
    TunnelBuildReply,
};
use crate::error::{Result, TunnelError};
use crate::hop::{TunnelHop, TunnelStep};

/// Get current timestamp in epoch milliseconds
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// What the router must do after processing a build request
#[derive(Debug, Clone)]
pub enum BuildAction {
    /// Pass the remaining records to the next hop
    Forward {
        next_ident: RecordHash,
        build: TunnelBuild,
    },
    /// Endpoint reached: return the collected statuses to the originator
    Reply {
        to: RecordHash,
        tunnel: TunnelId,
        reply: TunnelBuildReply,
    },
}

/// A tunnel whose every hop accepted the build
#[derive(Debug, Clone)]
pub struct EstablishedTunnel {
    /// Build message id this tunnel came from
    pub send_msg_id: u32,

    /// Identity hash of the gateway hop
    pub gateway: RecordHash,

    /// Tunnel id at the gateway
    pub gateway_tunnel: TunnelId,

    /// Per-hop keys in path order
    pub hops: Vec<HopKeys>,

    /// When the tunnel was confirmed (epoch milliseconds)
    pub established: i64,
}

/// Registry of hop duties and in-flight builds
#[derive(Debug, Default)]
pub struct TunnelManager {
    /// Hops this router serves, by receive tunnel id
    hops: HashMap<TunnelId, TunnelHop>,

    /// Originator-side builds awaiting a reply, by send message id
    pending: HashMap<u32, PendingBuild>,

    /// Confirmed tunnels this router originated, by send message id
    established: HashMap<u32, EstablishedTunnel>,
}

impl TunnelManager {
    pub fn new() -> Self {
        TunnelManager::default()
    }

    /// Number of hops this router currently serves
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Look up a hop by receive tunnel id
    pub fn hop(&self, tunnel: &TunnelId) -> Option<&TunnelHop> {
        self.hops.get(tunnel)
    }

    /// Confirmed tunnel for a build message id, if any
    pub fn established(&self, send_msg_id: u32) -> Option<&EstablishedTunnel> {
        self.established.get(&send_msg_id)
    }

    /// Remember an originator-side build until its reply arrives
    pub fn register_pending(&mut self, pending: PendingBuild) {
        self.pending.insert(pending.send_msg_id, pending);
    }

    /// Drop pending builds older than `max_age_ms`
    pub fn prune_pending(&mut self, max_age_ms: i64) -> usize {
        let cutoff = now_ms() - max_age_ms;
        let before = self.pending.len();
        self.pending.retain(|_, build| build.created >= cutoff);
        before - self.pending.len()
    }

    /// Relay a payload through a hop this router serves
    pub fn handle_data(&self, tunnel: &TunnelId, data: &[u8]) -> Result<TunnelStep> {
        let hop = self
            .hops
            .get(tunnel)
            .ok_or(TunnelError::UnknownTunnel(tunnel.as_u32()))?;
        hop.handle_data(data)
    }

    /// Process a build request addressed (in part) to this router
    ///
    /// Finds the record carrying the local identity prefix, hybrid-decrypts
    /// it, registers the requested hop, answers with an encrypted Accept,
    /// and peels one onion layer from every record still in flight. The own
    /// record is consumed here and never travels further.
    pub fn process_build(
        &mut self,
        mut build: TunnelBuild,
        local_prefix: &[u8; PEER_PREFIX_SIZE],
        recipient: &EncryptionPublicKey,
        secret: &EncryptionSecretKey,
    ) -> Result<BuildAction> {
        let encrypted = build
            .take_record(local_prefix)
            .ok_or(TunnelError::RecordNotFound)?;
        let record = encrypted.hybrid_decrypt(recipient, secret)?;

        if record.reply_requested {
            build.replies.push(BuildReplyRecord::encrypt_status(
                record.to_peer,
                &record.reply_key,
                &record.reply_iv,
                BuildReplyStatus::Accept,
            )?);
        }

        for other in build.records.iter_mut() {
            other.layered_decrypt(&record.layer_key, &record.iv_key)?;
        }

        let hop = TunnelHop::from_record(&record);
        self.hops.insert(record.receive_tunnel, hop);

        match record.role {
            HopRole::Endpoint => Ok(BuildAction::Reply {
                to: record.next_ident,
                tunnel: record.next_tunnel,
                reply: TunnelBuildReply {
                    send_msg_id: record.send_msg_id,
                    records: build.replies,
                },
            }),
            HopRole::Gateway | HopRole::Participant => Ok(BuildAction::Forward {
                next_ident: record.next_ident,
                build,
            }),
        }
    }

    /// Match a build reply against its pending build and bulk-decrypt the
    /// per-hop statuses
    ///
    /// When every hop accepted, the tunnel moves to the established set.
    pub fn complete_build(&mut self, reply: &TunnelBuildReply) -> Result<Vec<BuildReplyStatus>> {
        let pending = self
            .pending
            .remove(&reply.send_msg_id)
            .ok_or(TunnelError::UnknownBuild(reply.send_msg_id))?;

        let statuses = reply.decrypt_aes(&pending.hops)?;

        if statuses
            .iter()
            .all(|status| *status == BuildReplyStatus::Accept)
        {
            let gateway = &pending.hops[0];
            self.established.insert(
                pending.send_msg_id,
                EstablishedTunnel {
                    send_msg_id: pending.send_msg_id,
                    gateway: gateway.ident,
                    gateway_tunnel: gateway.receive_tunnel,
                    hops: pending.hops,
                    established: now_ms(),
                },
            );
        }

        Ok(statuses)
    }
}
