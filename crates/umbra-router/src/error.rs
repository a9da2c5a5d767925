//! Router error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors surfaced by the router service
///
/// Integrity failures and expired messages are not errors: they are logged
/// drops. What reaches this type is either a protocol defect (unknown type,
/// malformed payload) or an operational failure worth reporting.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] umbra_protocol::ProtocolError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] umbra_tunnel::TunnelError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] umbra_crypto::CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("No reachable address for peer {0}")]
    PeerUnresolvable(String),
}
