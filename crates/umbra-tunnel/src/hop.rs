//! Tunnel hop state machines
//!
//! An established hop owns exactly one set of per-hop symmetric keys and
//! applies one layer of peeling to every payload that traverses it. The
//! gateway accepts client-injected data, participants relay, the endpoint
//! delivers locally and knows where return traffic goes. No hop ever holds
//! keys belonging to another hop.

use umbra_crypto::{aead, AeadIv, AeadKey, AEAD_IV_SIZE};
use umbra_protocol::{RecordHash, TunnelId};

use crate::build::{BuildRecord, HopRole};
use crate::error::{Result, TunnelError};

/// What a hop does with a payload after peeling its layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelStep {
    /// Send the remaining layers onward
    Forward {
        /// Identity hash of the next hop
        to: RecordHash,
        /// Tunnel id at the next hop
        tunnel: TunnelId,
        /// Still-layered payload
        data: Vec<u8>,
    },
    /// Final layer removed: hand the plaintext to the local application
    Deliver { data: Vec<u8> },
}

/// One hop of an established tunnel
#[derive(Debug, Clone)]
pub struct TunnelHop {
    role: HopRole,
    receive_tunnel: TunnelId,
    layer_key: AeadKey,
    iv_key: AeadKey,
    next_ident: RecordHash,
    next_tunnel: TunnelId,
}

impl TunnelHop {
    /// Instantiate a hop from its decrypted build record
    pub fn from_record(record: &BuildRecord) -> Self {
        TunnelHop {
            role: record.role,
            receive_tunnel: record.receive_tunnel,
            layer_key: record.layer_key,
            iv_key: record.iv_key,
            next_ident: record.next_ident,
            next_tunnel: record.next_tunnel,
        }
    }

    pub fn role(&self) -> HopRole {
        self.role
    }

    pub fn receive_tunnel(&self) -> TunnelId {
        self.receive_tunnel
    }

    /// Where the endpoint routes return traffic
    pub fn reply_route(&self) -> Option<(RecordHash, TunnelId)> {
        match self.role {
            HopRole::Endpoint => Some((self.next_ident, self.next_tunnel)),
            _ => None,
        }
    }

    /// Peel this hop's layer and decide what happens next
    ///
    /// Gateway and participants forward the remaining layers; the endpoint
    /// exposes the innermost plaintext for local delivery.
    pub fn handle_data(&self, data: &[u8]) -> Result<TunnelStep> {
        let inner = peel_layer(&self.layer_key, data)?;

        match self.role {
            HopRole::Endpoint => Ok(TunnelStep::Deliver { data: inner }),
            HopRole::Gateway | HopRole::Participant => Ok(TunnelStep::Forward {
                to: self.next_ident,
                tunnel: self.next_tunnel,
                data: inner,
            }),
        }
    }

    /// Key this hop derives build-record layer IVs from
    pub fn iv_key(&self) -> &AeadKey {
        &self.iv_key
    }
}

/// Wrap a payload in one onion layer per hop, gateway layer outermost
///
/// Each layer is an explicit random IV followed by the AES-GCM ciphertext of
/// the layer below.
pub fn wrap_layers(layer_keys: &[AeadKey], payload: &[u8]) -> Result<Vec<u8>> {
    let mut data = payload.to_vec();
    for key in layer_keys.iter().rev() {
        let iv = AeadIv::generate();
        let ciphertext = aead::encrypt(key, &iv, &data)?;

        let mut layer = Vec::with_capacity(AEAD_IV_SIZE + ciphertext.len());
        layer.extend_from_slice(iv.as_bytes());
        layer.extend_from_slice(&ciphertext);
        data = layer;
    }
    Ok(data)
}

/// Remove one onion layer with the given layer key
pub fn peel_layer(layer_key: &AeadKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < AEAD_IV_SIZE {
        return Err(TunnelError::Crypto(
            umbra_crypto::CryptoError::AeadFailure,
        ));
    }

    let iv = AeadIv::from_slice(&data[..AEAD_IV_SIZE])?;
    Ok(aead::decrypt(layer_key, &iv, &data[AEAD_IV_SIZE..])?)
}
