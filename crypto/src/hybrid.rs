//! Hybrid DH + ML-KEM key agreement.
//!
//! ```text
//! initiator                                   responder
//!   HybridKeyPair::generate()
//!   ── dh_public, kem_public ──────────────▶
//!                                             HybridKeyPair::generate()
//!                                             dh  = DH(resp_priv, init_pub)
//!                                             (ct, kem) = Encaps(init_kem_pub)
//!                                             root = SHA256(dh || kem)
//!   ◀────────────── dh_public, ct ──────────
//!   dh  = DH(init_priv, resp_pub)
//!   kem = Decaps(init_kem_priv, ct)
//!   root = SHA256(dh || kem)
//! ```
//!
//! Both sides consume their key pair when the agreement completes, so an
//! ephemeral key is never reused for a second session.

use core::fmt;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::dh::{DhKeyPair, DhPublicKey, DhSharedSecret};
use crate::error::CryptoError;
use crate::hashes::sha256_concat;
use crate::ml_kem::{MlKemCiphertext, MlKemKeyPair, MlKemPublicKey, MlKemSharedSecret};
use crate::traits::{KemKeyPair, KemPublicKey};

pub const ROOT_SECRET_LEN: usize = 32;

/// Session root secret, `SHA256(dh_shared || kem_shared)`.
#[derive(Clone, PartialEq, Eq)]
pub struct RootSecret(Zeroizing<[u8; ROOT_SECRET_LEN]>);

impl RootSecret {
    pub fn from_bytes(bytes: [u8; ROOT_SECRET_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootSecret(..)")
    }
}

/// Fold the two independent shared secrets into the root secret. The DH
/// value always comes first.
pub fn combine_and_derive(
    dh_shared: &DhSharedSecret,
    kem_shared: &MlKemSharedSecret,
) -> RootSecret {
    RootSecret::from_bytes(sha256_concat(&[
        dh_shared.as_bytes(),
        kem_shared.as_bytes(),
    ]))
}

/// One ephemeral DH key pair plus one ephemeral ML-KEM-768 key pair.
pub struct HybridKeyPair {
    dh: DhKeyPair,
    kem: MlKemKeyPair,
}

impl HybridKeyPair {
    /// Fresh key pair from the operating system RNG.
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            dh: DhKeyPair::generate(rng),
            kem: MlKemKeyPair::generate(rng),
        }
    }

    pub fn dh_public(&self) -> &DhPublicKey {
        self.dh.public_key()
    }

    pub fn kem_public(&self) -> &MlKemPublicKey {
        self.kem.public_key()
    }

    /// Responder side: agree with the initiator's DH value, encapsulate to
    /// the initiator's KEM key, and derive the root secret. Returns the KEM
    /// ciphertext the initiator needs.
    pub fn respond<R: RngCore + CryptoRng>(
        self,
        peer_dh: &DhPublicKey,
        peer_kem: &MlKemPublicKey,
        rng: &mut R,
    ) -> Result<(MlKemCiphertext, RootSecret), CryptoError> {
        let dh_shared = self.dh.agree(peer_dh)?;
        let (ciphertext, kem_shared) = peer_kem.encapsulate(rng)?;
        Ok((ciphertext, combine_and_derive(&dh_shared, &kem_shared)))
    }

    /// Initiator side: agree with the responder's DH value and decapsulate
    /// the responder's ciphertext with our own KEM key.
    pub fn complete(
        self,
        peer_dh: &DhPublicKey,
        ciphertext: &MlKemCiphertext,
    ) -> Result<RootSecret, CryptoError> {
        let dh_shared = self.dh.agree(peer_dh)?;
        let kem_shared = self.kem.decapsulate(ciphertext)?;
        Ok(combine_and_derive(&dh_shared, &kem_shared))
    }
}

impl fmt::Debug for HybridKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridKeyPair")
            .field("dh", &self.dh)
            .field("kem", &self.kem)
            .finish()
    }
}
