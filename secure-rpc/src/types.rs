//! Type definitions for the secure RPC protocol

use std::collections::BTreeMap;
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Call-metadata key carrying the session id on `SendSecure`.
pub const SESSION_ID_METADATA_KEY: &str = "session-id";

/// Random bytes behind a session id (hex encoded on the wire).
pub const SESSION_ID_BYTES: usize = 16;

/// Longest session id accepted from a peer.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Longest client correlation token accepted by the responder.
pub const MAX_CLIENT_ID_LEN: usize = 256;

/// Opaque, unguessable session identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh identifier from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept an identifier received from a peer. Must be non-empty,
    /// bounded, and printable ASCII without spaces.
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = !value.is_empty()
            && value.len() <= MAX_SESSION_ID_LEN
            && value.bytes().all(|b| b.is_ascii_graphic());
        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Initiator's handshake message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeRequest {
    /// Opaque correlation token; carries no protocol meaning
    pub client_id: String,
    /// Initiator's DH public value (unsigned big-endian)
    pub dh_public_key: Vec<u8>,
    /// Initiator's ML-KEM-768 public key (1184 bytes)
    pub kem_public_key: Vec<u8>,
}

/// Responder's handshake reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeReply {
    pub session_id: String,
    /// Responder's DH public value (unsigned big-endian)
    pub dh_public_key: Vec<u8>,
    /// ML-KEM ciphertext encapsulated to the initiator's key (1088 bytes)
    pub kem_ciphertext: Vec<u8>,
}

/// Sealed request or reply body. The session id travels in [`Metadata`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureMessage {
    pub encrypted_data: Vec<u8>,
}

/// Out-of-band call metadata (string headers).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(session_id: &SessionId) -> Self {
        let mut metadata = Self::new();
        metadata.insert(SESSION_ID_METADATA_KEY, session_id.as_str());
        metadata
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(SESSION_ID_METADATA_KEY)
    }
}
