//! Two-message hybrid key exchange.
//!
//! The initiator sends its DH and ML-KEM public keys, the responder answers
//! with a session id, its own DH public value and a KEM ciphertext. There is
//! no confirmation message: a garbled reply leaves the initiator with a key
//! the server does not have, which only shows up as an authentication
//! failure on the first secure call.

use std::sync::Arc;

use crypto::dh::DhPublicKey;
use crypto::ml_kem::{MlKemCiphertext, MlKemPublicKey};
use crypto::traits::KemPublicKey;
use crypto::{HybridKeyPair, RootSecret};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::error::{Result, SecureRpcError};
use crate::store::SessionStore;
use crate::types::{KeyExchangeReply, KeyExchangeRequest, SessionId, MAX_CLIENT_ID_LEN};

/// Fresh ids are 128-bit random, so a second collision in a row means
/// something is badly wrong with the RNG.
const SESSION_ID_ATTEMPTS: usize = 3;

/// What the initiator keeps after a completed exchange.
#[derive(Clone, Debug)]
pub struct ClientSession {
    pub session_id: SessionId,
    pub root_secret: RootSecret,
}

/// Initiator state between sending the request and reading the reply.
#[derive(Debug)]
pub struct InitiatorHandshake {
    keypair: HybridKeyPair,
}

impl InitiatorHandshake {
    /// Generate an ephemeral key pair and the request carrying its public
    /// halves. `client_id` is an opaque correlation token.
    pub fn start(client_id: impl Into<String>) -> (Self, KeyExchangeRequest) {
        Self::start_with_rng(client_id, &mut OsRng)
    }

    pub fn start_with_rng<R: RngCore + CryptoRng>(
        client_id: impl Into<String>,
        rng: &mut R,
    ) -> (Self, KeyExchangeRequest) {
        let keypair = HybridKeyPair::generate_with_rng(rng);
        let request = KeyExchangeRequest {
            client_id: client_id.into(),
            dh_public_key: keypair.dh_public().to_bytes(),
            kem_public_key: keypair.kem_public().to_bytes(),
        };
        (Self { keypair }, request)
    }

    /// Validate the responder's reply and derive the root secret.
    pub fn finish(self, reply: &KeyExchangeReply) -> Result<ClientSession> {
        let session_id = SessionId::parse(&reply.session_id).ok_or_else(|| {
            SecureRpcError::ProtocolViolation("malformed session id in reply".to_string())
        })?;
        let peer_dh = DhPublicKey::from_bytes(&reply.dh_public_key)?;
        let ciphertext = MlKemCiphertext::from_bytes(&reply.kem_ciphertext)?;

        let root_secret = self.keypair.complete(&peer_dh, &ciphertext)?;
        tracing::debug!(session_id = %session_id, "key exchange complete");

        Ok(ClientSession {
            session_id,
            root_secret,
        })
    }
}

/// Server side of the exchange. Each accepted request becomes a session in
/// the shared store.
pub struct ResponderHandshake {
    store: Arc<SessionStore>,
    verbose_logging: bool,
}

impl ResponderHandshake {
    pub fn new(store: Arc<SessionStore>, verbose_logging: bool) -> Self {
        Self {
            store,
            verbose_logging,
        }
    }

    pub fn respond(&self, request: &KeyExchangeRequest) -> Result<KeyExchangeReply> {
        self.respond_with_rng(request, &mut OsRng)
    }

    pub fn respond_with_rng<R: RngCore + CryptoRng>(
        &self,
        request: &KeyExchangeRequest,
        rng: &mut R,
    ) -> Result<KeyExchangeReply> {
        let result = self.try_respond(request, rng);
        if let Err(e) = &result {
            tracing::warn!(
                client_id = %truncated(&request.client_id),
                error = %e,
                "key exchange rejected"
            );
        }
        result
    }

    fn try_respond<R: RngCore + CryptoRng>(
        &self,
        request: &KeyExchangeRequest,
        rng: &mut R,
    ) -> Result<KeyExchangeReply> {
        // Every field is checked before any key material is generated.
        if request.client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(SecureRpcError::ProtocolViolation(format!(
                "client id too long: {} bytes",
                request.client_id.len()
            )));
        }
        let peer_dh = DhPublicKey::from_bytes(&request.dh_public_key)?;
        let peer_kem = MlKemPublicKey::from_bytes(&request.kem_public_key)?;

        let keypair = HybridKeyPair::generate_with_rng(rng);
        let dh_public_key = keypair.dh_public().to_bytes();
        let (ciphertext, root_secret) = keypair.respond(&peer_dh, &peer_kem, rng)?;

        let session_id = self.allocate_session(root_secret)?;

        if self.verbose_logging {
            tracing::debug!(
                session_id = %session_id,
                client_id = %truncated(&request.client_id),
                "session established"
            );
        }

        Ok(KeyExchangeReply {
            session_id: session_id.as_str().to_string(),
            dh_public_key,
            kem_ciphertext: ciphertext.to_vec(),
        })
    }

    fn allocate_session(&self, root_secret: RootSecret) -> Result<SessionId> {
        for _ in 0..SESSION_ID_ATTEMPTS {
            let id = SessionId::generate();
            match self.store.create(id.clone(), root_secret.clone()) {
                Ok(_) => return Ok(id),
                Err(SecureRpcError::SessionCollision) => {
                    tracing::warn!(session_id = %id, "session id collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SecureRpcError::SessionCollision)
    }
}

/// Client ids are attacker-chosen; keep log lines bounded.
fn truncated(client_id: &str) -> &str {
    let mut end = client_id.len().min(64);
    while !client_id.is_char_boundary(end) {
        end -= 1;
    }
    &client_id[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecureRpcConfig;
    use crypto::ml_kem::{ML_KEM_CIPHERTEXT_LEN, ML_KEM_PUBLIC_KEY_LEN};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn responder() -> (ResponderHandshake, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::new(&SecureRpcConfig::default()));
        (ResponderHandshake::new(store.clone(), true), store)
    }

    #[test]
    fn test_full_handshake() {
        let (responder, store) = responder();

        let (initiator, request) = InitiatorHandshake::start("client-1");
        let reply = responder.respond(&request).unwrap();
        let client = initiator.finish(&reply).unwrap();

        assert_eq!(client.session_id.as_str(), reply.session_id);
        assert_eq!(reply.kem_ciphertext.len(), ML_KEM_CIPHERTEXT_LEN);

        let session = store.lookup(&client.session_id).unwrap();
        assert_eq!(session.root_secret(), &client.root_secret);
    }

    #[test]
    fn seeded_initiator_is_reproducible() {
        let (_, a) = InitiatorHandshake::start_with_rng("c", &mut ChaCha20Rng::seed_from_u64(9));
        let (_, b) = InitiatorHandshake::start_with_rng("c", &mut ChaCha20Rng::seed_from_u64(9));
        assert_eq!(a, b);
        assert_eq!(a.kem_public_key.len(), ML_KEM_PUBLIC_KEY_LEN);
    }

    #[test]
    fn malformed_requests_create_no_session() {
        let (responder, store) = responder();
        let (_, valid) = InitiatorHandshake::start("client");

        let mut long_id = valid.clone();
        long_id.client_id = "x".repeat(MAX_CLIENT_ID_LEN + 1);

        let mut short_kem = valid.clone();
        short_kem.kem_public_key.truncate(100);

        let mut unreduced_kem = valid.clone();
        unreduced_kem.kem_public_key[..1152].fill(0xFF);

        let mut zero_dh = valid.clone();
        zero_dh.dh_public_key = vec![0];

        let mut one_dh = valid.clone();
        one_dh.dh_public_key = vec![1];

        let mut empty_dh = valid.clone();
        empty_dh.dh_public_key.clear();

        let mut oversized_dh = valid.clone();
        oversized_dh.dh_public_key = vec![0xFF; 257];

        let requests = [
            long_id,
            short_kem,
            unreduced_kem,
            zero_dh,
            one_dh,
            empty_dh,
            oversized_dh,
        ];
        for request in requests {
            assert!(matches!(
                responder.respond(&request),
                Err(SecureRpcError::ProtocolViolation(_))
            ));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn client_id_at_limit_is_accepted() {
        let (responder, store) = responder();
        let (_, request) = InitiatorHandshake::start("y".repeat(MAX_CLIENT_ID_LEN));
        responder.respond(&request).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn malformed_replies_rejected() {
        let (responder, _) = responder();

        let cases: [fn(&mut KeyExchangeReply); 4] = [
            |r| r.session_id.clear(),
            |r| r.session_id = "not a valid id".to_string(),
            |r| r.kem_ciphertext.push(0),
            |r| r.dh_public_key = vec![1],
        ];
        for tamper in cases {
            let (initiator, request) = InitiatorHandshake::start("client");
            let mut reply = responder.respond(&request).unwrap();
            tamper(&mut reply);
            assert!(matches!(
                initiator.finish(&reply),
                Err(SecureRpcError::ProtocolViolation(_))
            ));
        }
    }

    #[test]
    fn garbled_ciphertext_goes_unnoticed() {
        let (responder, store) = responder();
        let (initiator, request) = InitiatorHandshake::start("client");
        let mut reply = responder.respond(&request).unwrap();
        reply.kem_ciphertext[10] ^= 0x01;

        let client = initiator.finish(&reply).unwrap();
        let session = store.lookup(&client.session_id).unwrap();
        assert_ne!(session.root_secret(), &client.root_secret);
    }

    #[test]
    fn long_client_ids_are_truncated_for_logs() {
        assert_eq!(truncated("short"), "short");
        assert_eq!(truncated(&"z".repeat(500)).len(), 64);
        let multibyte = "é".repeat(40);
        assert!(truncated(&multibyte).len() <= 64);
    }
}
