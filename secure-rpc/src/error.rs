//! Error types for the secure RPC layer

use std::fmt;

use crypto::CryptoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur inside the secure RPC layer.
///
/// These are internal: at the RPC boundary every variant is collapsed into a
/// [`Status`] via [`SecureRpcError::to_status`].
#[derive(Debug, Error)]
pub enum SecureRpcError {
    /// Malformed or out-of-range handshake input; no session is created
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Diffie-Hellman produced a degenerate shared value
    #[error("key agreement failed: {0}")]
    KeyAgreementFailure(CryptoError),

    /// Sealed payload too short to hold a nonce and a tag
    #[error("sealed message too short: {len} bytes")]
    Format { len: usize },

    /// AEAD tag verification failed
    #[error("authentication failed")]
    Authentication,

    /// Call carried no session id, or an id the store does not know
    #[error("session not found")]
    SessionNotFound,

    /// Session existed but its lifetime ran out; it has been removed
    #[error("session expired")]
    SessionExpired,

    /// A freshly generated session id was already taken
    #[error("session id collision")]
    SessionCollision,

    /// The application's message processor failed
    #[error("message processor failed: {0}")]
    Processor(String),

    /// The peer answered with an error status
    #[error("rejected by peer: {0}")]
    Rejected(Status),

    /// Encryption failure not caused by the peer
    #[error("encryption error: {0}")]
    Encryption(String),

    /// I/O error during communication
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Reply was not valid UTF-8 where text was expected
    #[error("reply is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Connection closed before a response arrived
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CryptoError> for SecureRpcError {
    fn from(e: CryptoError) -> Self {
        if e.is_malformed_input() {
            SecureRpcError::ProtocolViolation(e.to_string())
        } else {
            SecureRpcError::KeyAgreementFailure(e)
        }
    }
}

impl SecureRpcError {
    /// Collapse into the externally visible status. Session and
    /// authentication failures share one code and one message.
    pub fn to_status(&self) -> Status {
        match self {
            SecureRpcError::SessionNotFound
            | SecureRpcError::SessionExpired
            | SecureRpcError::Format { .. }
            | SecureRpcError::Authentication => Status::unauthenticated(),
            SecureRpcError::ProtocolViolation(_) | SecureRpcError::KeyAgreementFailure(_) => {
                Status::invalid_argument()
            }
            SecureRpcError::Rejected(status) => status.clone(),
            _ => Status::internal(),
        }
    }

    /// True for the errors that surface as `Unauthenticated`.
    pub fn is_unauthenticated(&self) -> bool {
        self.to_status().code == StatusCode::Unauthenticated
    }
}

/// Externally visible error classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Unauthenticated,
    InvalidArgument,
    Internal,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::Internal => "INTERNAL",
        }
    }
}

/// Error returned across the RPC boundary. Carries no internal detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn unauthenticated() -> Self {
        Self {
            code: StatusCode::Unauthenticated,
            message: "unauthenticated".to_string(),
        }
    }

    pub fn invalid_argument() -> Self {
        Self {
            code: StatusCode::InvalidArgument,
            message: "key exchange rejected".to_string(),
        }
    }

    pub fn internal() -> Self {
        Self {
            code: StatusCode::Internal,
            message: "processing failed".to_string(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for Status {}

/// Result type for secure RPC operations
pub type Result<T> = std::result::Result<T, SecureRpcError>;
