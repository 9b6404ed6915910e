//! Hybrid key-agreement primitives.
//!
//! A classical finite-field Diffie-Hellman exchange over the RFC 3526
//! 2048-bit MODP group is paired with an ML-KEM-768 encapsulation. The two
//! shared secrets are folded into one 32-byte [`hybrid::RootSecret`] with
//! `SHA256(dh_shared || kem_shared)`, so the root secret stays unpredictable
//! as long as either underlying problem remains hard.

pub mod dh;
pub mod error;
pub mod hashes;
pub mod hybrid;
pub mod ml_kem;
pub mod traits;

pub use error::CryptoError;
pub use hybrid::{HybridKeyPair, RootSecret};
