//! Tunnel error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TunnelError>;

/// Errors from tunnel construction and relaying
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("No build record addressed to this hop")]
    RecordNotFound,

    #[error("Build record addressed to a different hop")]
    Misaddressed,

    #[error("Unknown tunnel id: {0}")]
    UnknownTunnel(u32),

    #[error("No pending build for message id {0}")]
    UnknownBuild(u32),

    #[error("Tunnel path is empty")]
    EmptyPath,

    #[error("Crypto error: {0}")]
    Crypto(#[from] umbra_crypto::CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
