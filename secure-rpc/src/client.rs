//! Client side of the secure channel.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::cipher::MessageCipher;
use crate::config::SecureRpcConfig;
use crate::error::{Result, SecureRpcError};
use crate::handshake::{ClientSession, InitiatorHandshake};
use crate::transport::RpcTransport;
use crate::types::{Metadata, SecureMessage, SessionId};

/// Runs the key exchange on first use and reuses the session for every
/// later call.
///
/// When the server answers `Unauthenticated` (session expired, dropped, or
/// keys that never matched) the cached session is discarded; the next call
/// performs a fresh key exchange. Failed calls are never retried.
pub struct SecureClient<T> {
    transport: T,
    config: SecureRpcConfig,
    client_id: String,
    session: Option<ClientSession>,
}

impl<T: RpcTransport> SecureClient<T> {
    pub fn new(transport: T, config: SecureRpcConfig) -> Self {
        let mut id = [0u8; 16];
        OsRng.fill_bytes(&mut id);
        Self::with_client_id(transport, config, hex::encode(id))
    }

    pub fn with_client_id(
        transport: T,
        config: SecureRpcConfig,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            client_id: client_id.into(),
            session: None,
        }
    }

    /// Run a fresh key exchange, replacing any current session.
    pub async fn connect(&mut self) -> Result<&SessionId> {
        let (handshake, request) = InitiatorHandshake::start(self.client_id.clone());
        let reply = self.transport.key_exchange(request).await?;
        let session = handshake.finish(&reply)?;

        if self.config.verbose_logging {
            tracing::debug!(
                client_id = %self.client_id,
                session_id = %session.session_id,
                "connected"
            );
        }
        Ok(&self.session.insert(session).session_id)
    }

    /// Seal `data`, send it, and open the reply.
    pub async fn send(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let result = self.try_send(data).await;
        if let Err(e) = &result {
            if e.is_unauthenticated() && self.session.take().is_some() {
                tracing::debug!(client_id = %self.client_id, "session discarded after {}", e);
            }
        }
        result
    }

    async fn try_send(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.session.is_none() {
            self.connect().await?;
        }
        let Some(session) = self.session.as_ref() else {
            return Err(SecureRpcError::SessionNotFound);
        };

        let schedule = self.config.key_schedule;
        let request_key = schedule.request_key(&session.root_secret, &session.session_id);
        let message = SecureMessage {
            encrypted_data: MessageCipher::new(&request_key).seal(data)?,
        };

        let reply = self
            .transport
            .send_secure(message, Metadata::with_session_id(&session.session_id))
            .await?;

        let reply_key = schedule.reply_key(&session.root_secret, &session.session_id);
        MessageCipher::new(&reply_key).open(&reply.encrypted_data)
    }

    /// [`send`](Self::send) for UTF-8 text.
    pub async fn send_str(&mut self, message: &str) -> Result<String> {
        let reply = self.send(message.as_bytes()).await?;
        Ok(String::from_utf8(reply)?)
    }

    /// Forget the current session without contacting the server.
    pub fn reset(&mut self) {
        self.session = None;
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.session_id)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
