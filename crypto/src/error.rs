use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid length: expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(&'static str),

    #[error("degenerate shared secret")]
    DegenerateSharedSecret,

    #[error("encapsulation failed")]
    EncapsulationFailed,

    #[error("decapsulation failed")]
    DecapsulationFailed,
}

impl CryptoError {
    /// True when the error was caused by malformed peer input rather than by
    /// the outcome of a key agreement.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidLength { .. } | CryptoError::InvalidPublicKey(_)
        )
    }
}
