//! Purpose-scoped subkeys of a session's root secret.
//!
//! `key = HMAC-SHA256(root_secret, "{session_id}:{purpose}")`. Keys are
//! recomputed for every call and dropped (and wiped) when the call ends.

use std::fmt;

use crypto::hashes::hmac_sha256;
use crypto::RootSecret;
use zeroize::Zeroizing;

use crate::types::SessionId;

/// Purpose used for both directions under [`KeySchedule::Shared`].
pub const PURPOSE_ENCRYPTION: &str = "encryption";
pub const PURPOSE_CLIENT_TO_SERVER: &str = "client-to-server";
pub const PURPOSE_SERVER_TO_CLIENT: &str = "server-to-client";

pub const DERIVED_KEY_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey(Zeroizing<[u8; DERIVED_KEY_LEN]>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

pub fn derive_key(root: &RootSecret, session_id: &SessionId, purpose: &str) -> DerivedKey {
    let label = format!("{}:{}", session_id.as_str(), purpose);
    DerivedKey(Zeroizing::new(hmac_sha256(root.as_bytes(), label.as_bytes())))
}

/// Which subkeys protect the two directions of a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeySchedule {
    /// One `"encryption"` key for requests and replies alike.
    Shared,
    /// `"client-to-server"` for requests, `"server-to-client"` for replies.
    #[default]
    Directional,
}

impl KeySchedule {
    pub fn request_purpose(&self) -> &'static str {
        match self {
            KeySchedule::Shared => PURPOSE_ENCRYPTION,
            KeySchedule::Directional => PURPOSE_CLIENT_TO_SERVER,
        }
    }

    pub fn reply_purpose(&self) -> &'static str {
        match self {
            KeySchedule::Shared => PURPOSE_ENCRYPTION,
            KeySchedule::Directional => PURPOSE_SERVER_TO_CLIENT,
        }
    }

    pub fn request_key(&self, root: &RootSecret, session_id: &SessionId) -> DerivedKey {
        derive_key(root, session_id, self.request_purpose())
    }

    pub fn reply_key(&self, root: &RootSecret, session_id: &SessionId) -> DerivedKey {
        derive_key(root, session_id, self.reply_purpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn root(byte: u8) -> RootSecret {
        RootSecret::from_bytes([byte; 32])
    }

    fn session(id: &str) -> SessionId {
        SessionId::parse(id).unwrap()
    }

    #[test]
    fn matches_hmac_of_id_and_purpose() {
        let key = derive_key(&root(7), &session("abc123"), "encryption");

        let mut mac = Hmac::<Sha256>::new_from_slice(&[7u8; 32]).unwrap();
        mac.update(b"abc123:encryption");
        let expected: [u8; 32] = mac.finalize().into_bytes().into();

        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn purposes_and_sessions_separate_keys() {
        let id = session("s1");
        let base = derive_key(&root(1), &id, PURPOSE_ENCRYPTION);

        assert_eq!(base, derive_key(&root(1), &id, PURPOSE_ENCRYPTION));
        assert_ne!(base, derive_key(&root(1), &id, PURPOSE_CLIENT_TO_SERVER));
        assert_ne!(base, derive_key(&root(1), &session("s2"), PURPOSE_ENCRYPTION));
        assert_ne!(base, derive_key(&root(2), &id, PURPOSE_ENCRYPTION));
    }

    #[test]
    fn schedules() {
        let id = session("s1");
        let shared = KeySchedule::Shared;
        assert_eq!(shared.request_key(&root(1), &id), shared.reply_key(&root(1), &id));

        let directional = KeySchedule::Directional;
        assert_ne!(
            directional.request_key(&root(1), &id),
            directional.reply_key(&root(1), &id)
        );
        assert_eq!(
            directional.request_key(&root(1), &id),
            derive_key(&root(1), &id, "client-to-server")
        );
    }
}
