//! Server side of the secure channel.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::SecureRpcConfig;
use crate::error::{Result, Status};
use crate::handler::{MessageProcessor, SecureCallHandler};
use crate::handshake::ResponderHandshake;
use crate::store::SessionStore;
use crate::types::{KeyExchangeReply, KeyExchangeRequest, Metadata, SecureMessage};

/// Owns the session store and answers the two RPC operations,
/// `KeyExchange` and `SendSecure`.
///
/// Errors leave this type only as a [`Status`]; which check failed is never
/// revealed to the caller.
pub struct SecureService {
    config: SecureRpcConfig,
    store: Arc<SessionStore>,
    responder: ResponderHandshake,
    handler: SecureCallHandler,
}

impl SecureService {
    pub fn new(
        config: SecureRpcConfig,
        processor: impl MessageProcessor + 'static,
    ) -> Result<Self> {
        Self::with_clock(config, Arc::new(processor), Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SecureRpcConfig,
        processor: Arc<dyn MessageProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SessionStore::with_clock(&config, clock));
        let responder = ResponderHandshake::new(store.clone(), config.verbose_logging);
        let handler = SecureCallHandler::new(store.clone(), processor, config.key_schedule);

        tracing::debug!(
            key_schedule = ?config.key_schedule,
            session_ttl_secs = config.session_ttl.as_secs(),
            "secure service started"
        );

        Ok(Self {
            config,
            store,
            responder,
            handler,
        })
    }

    pub fn key_exchange(
        &self,
        request: KeyExchangeRequest,
    ) -> std::result::Result<KeyExchangeReply, Status> {
        self.responder.respond(&request).map_err(|e| e.to_status())
    }

    /// `metadata` must carry the `session-id` issued by `key_exchange`.
    pub async fn send_secure(
        &self,
        message: SecureMessage,
        metadata: &Metadata,
    ) -> std::result::Result<SecureMessage, Status> {
        let encrypted_data = self
            .handler
            .handle(metadata.session_id(), &message.encrypted_data)
            .await
            .map_err(|e| e.to_status())?;
        Ok(SecureMessage { encrypted_data })
    }

    pub fn config(&self) -> &SecureRpcConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Discard every session. Clients must run a new key exchange.
    pub fn shutdown(&self) {
        let sessions = self.store.len();
        self.store.clear();
        tracing::debug!(sessions, "secure service shut down");
    }
}
