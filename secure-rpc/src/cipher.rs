//! AES-256-GCM sealing of opaque payloads under a derived key.
//!
//! Wire layout: `nonce (12) || ciphertext || tag (16)`. Every seal draws a
//! fresh random nonce, so concurrent calls under one key never coordinate.

use aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;

use crate::error::{Result, SecureRpcError};
use crate::kdf::DerivedKey;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Smallest well-formed sealed message (empty plaintext).
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

/// AES-256-GCM wrapper bound to one derived key.
pub struct MessageCipher {
    cipher: Aes256Gcm,
}

impl MessageCipher {
    pub fn new(key: &DerivedKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Encrypt a message under a fresh random nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SecureRpcError::Encryption(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a sealed message
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < MIN_SEALED_LEN {
            return Err(SecureRpcError::Format { len: sealed.len() });
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecureRpcError::Authentication)
    }
}

/// Split the nonce off a sealed message without decrypting it.
pub fn sealed_nonce(sealed: &[u8]) -> Option<[u8; NONCE_LEN]> {
    sealed.get(..NONCE_LEN)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_key;
    use crate::types::SessionId;
    use crypto::RootSecret;
    use std::collections::HashSet;

    fn key(byte: u8) -> DerivedKey {
        derive_key(
            &RootSecret::from_bytes([byte; 32]),
            &SessionId::parse("cipher-test").unwrap(),
            "encryption",
        )
    }

    #[test]
    fn test_cipher_roundtrip() {
        let cipher = MessageCipher::new(&key(1));
        let plaintext = b"Hello, quantum world!";
        let sealed = cipher.seal(plaintext).unwrap();
        assert_eq!(sealed.len(), MIN_SEALED_LEN + plaintext.len());
        assert_eq!(cipher.open(&sealed).unwrap(), plaintext.to_vec());
    }

    #[test]
    fn empty_plaintext_seals_to_minimum_length() {
        let cipher = MessageCipher::new(&key(1));
        let sealed = cipher.seal(b"").unwrap();
        assert_eq!(sealed.len(), MIN_SEALED_LEN);
        assert!(cipher.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn short_input_is_format_error() {
        let cipher = MessageCipher::new(&key(1));
        for len in [0, 1, NONCE_LEN, MIN_SEALED_LEN - 1] {
            assert!(matches!(
                cipher.open(&vec![0u8; len]),
                Err(SecureRpcError::Format { len: l }) if l == len
            ));
        }
        // Exactly 28 garbage bytes parse, then fail authentication.
        assert!(matches!(
            cipher.open(&[0u8; MIN_SEALED_LEN]),
            Err(SecureRpcError::Authentication)
        ));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = MessageCipher::new(&key(1)).seal(b"secret").unwrap();
        assert!(matches!(
            MessageCipher::new(&key(2)).open(&sealed),
            Err(SecureRpcError::Authentication)
        ));
    }

    #[test]
    fn nonces_do_not_repeat() {
        let cipher = MessageCipher::new(&key(1));
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let sealed = cipher.seal(b"same plaintext").unwrap();
            assert!(seen.insert(sealed_nonce(&sealed).unwrap()));
        }
    }
}
