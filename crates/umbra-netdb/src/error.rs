//! Network database error types

use thiserror::Error;

/// Database-specific errors
#[derive(Error, Debug)]
pub enum NetDbError {
    #[error("Record not found")]
    RecordNotFound,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Protocol error: {0}")]
    Protocol(#[from] umbra_protocol::ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] umbra_crypto::CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, NetDbError>;
