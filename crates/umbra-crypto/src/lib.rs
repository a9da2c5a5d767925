//! Umbra cryptography
//!
//! Key material and primitives shared by the network database and the
//! tunnel-build protocol:
//! - Router and destination identities (Curve25519 encryption key +
//!   Ed25519 signing key, hashed to a stable 32-byte identifier)
//! - Sealed-box asymmetric envelopes for small identity-revealing fields
//! - AES-128-GCM authenticated encryption for bulk payloads

pub mod aead;
pub mod error;
pub mod identity;
pub mod sealed;

pub use aead::{AeadIv, AeadKey, AEAD_IV_SIZE, AEAD_KEY_SIZE};
pub use error::{CryptoError, Result};
pub use identity::{
    verify_signature, Destination, DestinationIdentity, EncryptionPublicKey, EncryptionSecretKey,
    RouterId, RouterIdentity, Signature, SigningPublicKey, SigningSecretKey,
};

/// Initialize the underlying crypto library
///
/// Must be called once before key generation; safe to call repeatedly.
pub fn init() -> Result<()> {
    sodiumoxide::init().map_err(|_| CryptoError::InitFailed)
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init() {
        assert!(super::init().is_ok());
    }
}
