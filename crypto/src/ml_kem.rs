//! ML-KEM-768 (FIPS 203) key encapsulation.
//!
//! Thin owned-bytes wrappers over the RustCrypto `ml-kem` crate. Every value
//! received from a peer is length-checked on parse; the KEM's own fixed-size
//! encoding is used on the wire.

use core::fmt;

use ml_kem::kem::{Decapsulate, DecapsulationKey, Encapsulate, EncapsulationKey};
use ml_kem::{EncodedSizeUser, KemCore, MlKem768, MlKem768Params};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::traits::{KemKeyPair, KemPublicKey};

pub const ML_KEM_PUBLIC_KEY_LEN: usize = 1184;
pub const ML_KEM_SECRET_KEY_LEN: usize = 2400;
pub const ML_KEM_CIPHERTEXT_LEN: usize = 1088;
pub const ML_KEM_SHARED_SECRET_LEN: usize = 32;

/// Modulus of the ML-KEM polynomial ring.
const ML_KEM_Q: u16 = 3329;
/// Encoded `t` vector leading an ML-KEM-768 encapsulation key.
const ML_KEM_T_HAT_LEN: usize = 1152;

fn check_len(bytes: &[u8], expected: usize) -> Result<(), CryptoError> {
    if bytes.len() != expected {
        return Err(CryptoError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// FIPS 203 modulus check: every 12-bit coefficient of the encoded `t`
/// vector must be reduced mod q.
fn check_modulus(encapsulation_key: &[u8]) -> Result<(), CryptoError> {
    let reduced = encapsulation_key[..ML_KEM_T_HAT_LEN].chunks_exact(3).all(|b| {
        let lo = u16::from(b[0]) | (u16::from(b[1] & 0x0F) << 8);
        let hi = u16::from(b[1] >> 4) | (u16::from(b[2]) << 4);
        lo < ML_KEM_Q && hi < ML_KEM_Q
    });
    if !reduced {
        return Err(CryptoError::InvalidPublicKey("coefficient not reduced mod q"));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlKemCiphertext {
    bytes: [u8; ML_KEM_CIPHERTEXT_LEN],
}

impl MlKemCiphertext {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        check_len(bytes, ML_KEM_CIPHERTEXT_LEN)?;
        let mut arr = [0u8; ML_KEM_CIPHERTEXT_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

/// 32-byte KEM shared secret, wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct MlKemSharedSecret {
    bytes: Zeroizing<[u8; ML_KEM_SHARED_SECRET_LEN]>,
}

impl MlKemSharedSecret {
    fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        check_len(bytes, ML_KEM_SHARED_SECRET_LEN)?;
        let mut arr = Zeroizing::new([0u8; ML_KEM_SHARED_SECRET_LEN]);
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl fmt::Debug for MlKemSharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MlKemSharedSecret(..)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlKemPublicKey {
    bytes: [u8; ML_KEM_PUBLIC_KEY_LEN],
}

impl MlKemPublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl KemPublicKey for MlKemPublicKey {
    type Ciphertext = MlKemCiphertext;
    type SharedSecret = MlKemSharedSecret;

    fn encapsulate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(Self::Ciphertext, Self::SharedSecret), CryptoError> {
        let encapsulation_key =
            EncapsulationKey::<MlKem768Params>::from_bytes(&self.bytes.into());
        let (ciphertext, shared_secret) = encapsulation_key
            .encapsulate(rng)
            .map_err(|_| CryptoError::EncapsulationFailed)?;

        let ciphertext = MlKemCiphertext::from_bytes(&ciphertext[..])?;
        let shared_secret = MlKemSharedSecret::from_slice(&shared_secret[..])?;
        Ok((ciphertext, shared_secret))
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        check_len(bytes, ML_KEM_PUBLIC_KEY_LEN)?;
        check_modulus(bytes)?;
        let mut arr = [0u8; ML_KEM_PUBLIC_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }
}

/// Ephemeral ML-KEM-768 key pair. The decapsulation key is zeroed on drop.
pub struct MlKemKeyPair {
    decapsulation_key_bytes: Zeroizing<[u8; ML_KEM_SECRET_KEY_LEN]>,
    public: MlKemPublicKey,
}

impl KemKeyPair for MlKemKeyPair {
    type PublicKey = MlKemPublicKey;
    type Ciphertext = MlKemCiphertext;
    type SharedSecret = MlKemSharedSecret;

    fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (decapsulation_key, encapsulation_key) = MlKem768::generate(rng);

        let mut dk_bytes = Zeroizing::new([0u8; ML_KEM_SECRET_KEY_LEN]);
        dk_bytes.copy_from_slice(&decapsulation_key.as_bytes()[..]);
        let mut ek_bytes = [0u8; ML_KEM_PUBLIC_KEY_LEN];
        ek_bytes.copy_from_slice(&encapsulation_key.as_bytes()[..]);

        Self {
            decapsulation_key_bytes: dk_bytes,
            public: MlKemPublicKey { bytes: ek_bytes },
        }
    }

    fn decapsulate(
        &self,
        ciphertext: &Self::Ciphertext,
    ) -> Result<Self::SharedSecret, CryptoError> {
        let decapsulation_key = DecapsulationKey::<MlKem768Params>::from_bytes(
            &(*self.decapsulation_key_bytes).into(),
        );
        let shared_secret = decapsulation_key
            .decapsulate(&ciphertext.bytes.into())
            .map_err(|_| CryptoError::DecapsulationFailed)?;
        MlKemSharedSecret::from_slice(&shared_secret[..])
    }

    fn public_key(&self) -> &Self::PublicKey {
        &self.public
    }
}

impl fmt::Debug for MlKemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlKemKeyPair")
            .field("public", &hex::encode(&self.public.bytes[..8]))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn encapsulate_decapsulate_agree() {
        let keypair = MlKemKeyPair::generate(&mut OsRng);
        let (ciphertext, sender_secret) = keypair.public_key().encapsulate(&mut OsRng).unwrap();
        let recipient_secret = keypair.decapsulate(&ciphertext).unwrap();

        assert_eq!(sender_secret, recipient_secret);
        assert_eq!(ciphertext.as_bytes().len(), ML_KEM_CIPHERTEXT_LEN);
        assert_eq!(sender_secret.as_bytes().len(), ML_KEM_SHARED_SECRET_LEN);
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = MlKemKeyPair::generate(&mut ChaCha20Rng::seed_from_u64(7));
        let b = MlKemKeyPair::generate(&mut ChaCha20Rng::seed_from_u64(7));
        let c = MlKemKeyPair::generate(&mut ChaCha20Rng::seed_from_u64(8));

        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn public_key_round_trips_through_bytes() {
        let keypair = MlKemKeyPair::generate(&mut OsRng);
        let bytes = keypair.public_key().to_bytes();
        assert_eq!(bytes.len(), ML_KEM_PUBLIC_KEY_LEN);

        let parsed = MlKemPublicKey::from_bytes(&bytes).unwrap();
        let (ciphertext, sender_secret) = parsed.encapsulate(&mut OsRng).unwrap();
        assert_eq!(keypair.decapsulate(&ciphertext).unwrap(), sender_secret);
    }

    #[test]
    fn wrong_lengths_rejected() {
        assert_eq!(
            MlKemPublicKey::from_bytes(&[0u8; ML_KEM_PUBLIC_KEY_LEN - 1]),
            Err(CryptoError::InvalidLength {
                expected: ML_KEM_PUBLIC_KEY_LEN,
                actual: ML_KEM_PUBLIC_KEY_LEN - 1,
            })
        );
        assert!(MlKemCiphertext::from_bytes(&[]).is_err());
        assert!(MlKemCiphertext::from_bytes(&[0u8; ML_KEM_CIPHERTEXT_LEN + 1]).is_err());
    }

    #[test]
    fn unreduced_coefficients_rejected() {
        let keypair = MlKemKeyPair::generate(&mut OsRng);
        let valid = keypair.public_key().to_bytes();

        let mut all_ones = valid.clone();
        all_ones[..ML_KEM_T_HAT_LEN].fill(0xFF);
        assert!(matches!(
            MlKemPublicKey::from_bytes(&all_ones),
            Err(CryptoError::InvalidPublicKey(_))
        ));

        // Last coefficient set to 0xD01, one past q.
        let mut at_q = valid.clone();
        at_q[ML_KEM_T_HAT_LEN - 2] = (at_q[ML_KEM_T_HAT_LEN - 2] & 0x0F) | 0x10;
        at_q[ML_KEM_T_HAT_LEN - 1] = 0xD0;
        assert!(MlKemPublicKey::from_bytes(&at_q).is_err());

        // First coefficient q - 1 is still valid.
        let mut below_q = valid;
        below_q[0] = 0x00;
        below_q[1] = (below_q[1] & 0xF0) | 0x0D;
        assert!(MlKemPublicKey::from_bytes(&below_q).is_ok());
    }

    #[test]
    fn seed_bytes_are_not_checked() {
        let keypair = MlKemKeyPair::generate(&mut OsRng);
        let mut bytes = keypair.public_key().to_bytes();
        bytes[ML_KEM_T_HAT_LEN..].fill(0xFF);
        assert!(MlKemPublicKey::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn garbled_ciphertext_yields_different_secret() {
        let keypair = MlKemKeyPair::generate(&mut OsRng);
        let (ciphertext, sender_secret) = keypair.public_key().encapsulate(&mut OsRng).unwrap();

        let mut garbled = ciphertext.to_vec();
        garbled[0] ^= 0x01;
        let garbled = MlKemCiphertext::from_bytes(&garbled).unwrap();

        let recipient_secret = keypair.decapsulate(&garbled).unwrap();
        assert_ne!(sender_secret, recipient_secret);
    }
}
