//! Sealed asymmetric envelopes
//!
//! Small identity-revealing fields (hop prefixes, reply keys, reply IVs) are
//! encrypted individually to a recipient's Curve25519 public key. The scheme
//! supplies a fresh ephemeral key pair per seal, so sealing the same
//! plaintext twice yields unrelated ciphertexts. Only the holder of the
//! matching secret key can open an envelope.

use sodiumoxide::crypto::sealedbox;

use crate::error::{CryptoError, Result};
use crate::identity::{EncryptionPublicKey, EncryptionSecretKey};

/// Number of bytes a sealed envelope adds on top of the plaintext
pub const SEAL_OVERHEAD: usize = sealedbox::SEALBYTES;

/// Seal plaintext to a recipient's encryption public key
pub fn seal(recipient: &EncryptionPublicKey, plaintext: &[u8]) -> Vec<u8> {
    sealedbox::seal(plaintext, recipient)
}

/// Open a sealed envelope with the recipient's key pair
pub fn open(
    recipient: &EncryptionPublicKey,
    secret: &EncryptionSecretKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    sealedbox::open(ciphertext, recipient, secret).map_err(|_| CryptoError::EnvelopeFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RouterIdentity;

    #[test]
    fn test_seal_open_round_trip() {
        let identity = RouterIdentity::generate().unwrap();
        let plaintext = b"reply key material";

        let sealed = seal(&identity.router_id().encryption_key, plaintext);
        assert_eq!(sealed.len(), plaintext.len() + SEAL_OVERHEAD);

        let opened = open(
            &identity.router_id().encryption_key,
            identity.encryption_secret(),
            &sealed,
        )
        .unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_fresh_randomness_per_seal() {
        let identity = RouterIdentity::generate().unwrap();
        let plaintext = b"same plaintext";

        let a = seal(&identity.router_id().encryption_key, plaintext);
        let b = seal(&identity.router_id().encryption_key, plaintext);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let alice = RouterIdentity::generate().unwrap();
        let bob = RouterIdentity::generate().unwrap();

        let sealed = seal(&alice.router_id().encryption_key, b"for alice only");

        let result = open(
            &bob.router_id().encryption_key,
            bob.encryption_secret(),
            &sealed,
        );
        assert_eq!(result, Err(CryptoError::EnvelopeFailure));
    }

    #[test]
    fn test_tampered_envelope_rejected() {
        let identity = RouterIdentity::generate().unwrap();
        let mut sealed = seal(&identity.router_id().encryption_key, b"payload");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        let result = open(
            &identity.router_id().encryption_key,
            identity.encryption_secret(),
            &sealed,
        );
        assert!(result.is_err());
    }
}
