//! Finite-field Diffie-Hellman over the RFC 3526 2048-bit MODP group.
//!
//! Values travel as unsigned big-endian byte strings with no padding, which
//! is the encoding both peers feed into the root-secret hash.

use core::fmt;
use std::sync::OnceLock;

use num_bigint::BigUint;
use num_traits::One;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// RFC 3526 group 14 prime.
const MODP_2048_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

const MODP_2048_GENERATOR: u32 = 2;

/// Byte length of the group modulus; no valid public value is longer.
pub const DH_MODULUS_LEN: usize = 256;

/// Bits of randomness in a private exponent.
pub const DH_PRIVATE_EXPONENT_BITS: usize = 512;

/// A fixed prime-order-subgroup DH group (`p` safe prime, generator `g`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DhGroup {
    p: BigUint,
    g: BigUint,
    p_minus_one: BigUint,
}

impl DhGroup {
    /// The process-wide 2048-bit MODP group. Parsed once.
    pub fn modp2048() -> &'static DhGroup {
        static GROUP: OnceLock<DhGroup> = OnceLock::new();
        GROUP.get_or_init(|| {
            let p = BigUint::parse_bytes(MODP_2048_PRIME_HEX.as_bytes(), 16)
                .expect("RFC 3526 prime is valid hex");
            let p_minus_one = &p - BigUint::one();
            DhGroup {
                p,
                g: BigUint::from(MODP_2048_GENERATOR),
                p_minus_one,
            }
        })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// `1 < value < p - 1`; everything else lies in a subgroup of order <= 2.
    fn is_acceptable(&self, value: &BigUint) -> bool {
        *value > BigUint::one() && *value < self.p_minus_one
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DhPublicKey {
    value: BigUint,
}

impl DhPublicKey {
    /// Parse and range-check a peer's public value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() {
            return Err(CryptoError::InvalidPublicKey("empty DH public value"));
        }
        if bytes.len() > DH_MODULUS_LEN {
            return Err(CryptoError::InvalidLength {
                expected: DH_MODULUS_LEN,
                actual: bytes.len(),
            });
        }
        let value = BigUint::from_bytes_be(bytes);
        if !DhGroup::modp2048().is_acceptable(&value) {
            return Err(CryptoError::InvalidPublicKey(
                "DH public value outside (1, p-1)",
            ));
        }
        Ok(Self { value })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.value.to_bytes_be()
    }
}

impl fmt::Debug for DhPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.value.to_bytes_be();
        write!(f, "DhPublicKey({}..)", hex::encode(&bytes[..bytes.len().min(8)]))
    }
}

/// Shared value `peer^x mod p`, minimal big-endian, wiped on drop.
pub struct DhSharedSecret {
    bytes: Zeroizing<Vec<u8>>,
}

impl DhSharedSecret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for DhSharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DhSharedSecret(..)")
    }
}

pub struct DhKeyPair {
    private: BigUint,
    public: DhPublicKey,
}

impl DhKeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let group = DhGroup::modp2048();

        let mut seed = Zeroizing::new([0u8; DH_PRIVATE_EXPONENT_BITS / 8]);
        rng.fill_bytes(&mut seed[..]);
        // x in [2, p - 2]
        let bound = &group.p - BigUint::from(3u32);
        let private = BigUint::from_bytes_be(&seed[..]) % bound + BigUint::from(2u32);

        let public = DhPublicKey {
            value: group.g.modpow(&private, &group.p),
        };
        Self { private, public }
    }

    pub fn public_key(&self) -> &DhPublicKey {
        &self.public
    }

    /// Agree with a peer's (already validated) public value. A shared value
    /// in a degenerate subgroup is refused.
    pub fn agree(&self, peer: &DhPublicKey) -> Result<DhSharedSecret, CryptoError> {
        let group = DhGroup::modp2048();
        let shared = peer.value.modpow(&self.private, &group.p);
        if !group.is_acceptable(&shared) {
            return Err(CryptoError::DegenerateSharedSecret);
        }
        Ok(DhSharedSecret {
            bytes: Zeroizing::new(shared.to_bytes_be()),
        })
    }
}

impl fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
