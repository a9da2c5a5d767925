//! Crypto error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors from cryptographic operations
///
/// Key-material errors are unrecoverable for the operation that hit them and
/// are always surfaced to the caller; they must never leave partial state
/// behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Crypto library initialization failed")]
    InitFailed,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("AEAD authentication failed")]
    AeadFailure,

    #[error("Asymmetric envelope could not be opened")]
    EnvelopeFailure,

    #[error("Signature verification failed")]
    SignatureInvalid,
}
