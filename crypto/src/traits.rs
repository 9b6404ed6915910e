use rand::{CryptoRng, RngCore};

use crate::error::CryptoError;

pub trait KemPublicKey: Sized + Clone {
    type Ciphertext: Sized + Clone;
    type SharedSecret: Sized;

    fn encapsulate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(Self::Ciphertext, Self::SharedSecret), CryptoError>;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
}

pub trait KemKeyPair: Sized {
    type PublicKey: KemPublicKey<Ciphertext = Self::Ciphertext, SharedSecret = Self::SharedSecret>;
    type Ciphertext: Sized + Clone;
    type SharedSecret: Sized;

    fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self;
    fn decapsulate(&self, ciphertext: &Self::Ciphertext)
        -> Result<Self::SharedSecret, CryptoError>;
    fn public_key(&self) -> &Self::PublicKey;
}
