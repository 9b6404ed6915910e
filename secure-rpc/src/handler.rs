//! Secure call handling: open the request, run the application's
//! processor, seal the reply.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;

use crate::cipher::MessageCipher;
use crate::error::{Result, SecureRpcError};
use crate::kdf::KeySchedule;
use crate::store::SessionStore;
use crate::types::SessionId;

/// Failure reported by a [`MessageProcessor`]. The text stays on the
/// server; callers only ever see a generic internal error.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessorError(String);

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Application hook that turns a decrypted request into a reply.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, request: Vec<u8>) -> std::result::Result<Vec<u8>, ProcessorError>;
}

/// Returns every request unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoProcessor;

#[async_trait]
impl MessageProcessor for EchoProcessor {
    async fn process(&self, request: Vec<u8>) -> std::result::Result<Vec<u8>, ProcessorError> {
        Ok(request)
    }
}

/// Adapter returned by [`processor_fn`].
pub struct FnProcessor<F>(F);

#[async_trait]
impl<F> MessageProcessor for FnProcessor<F>
where
    F: Fn(Vec<u8>) -> std::result::Result<Vec<u8>, ProcessorError> + Send + Sync,
{
    async fn process(&self, request: Vec<u8>) -> std::result::Result<Vec<u8>, ProcessorError> {
        (self.0)(request)
    }
}

/// Wrap a synchronous closure as a [`MessageProcessor`].
pub fn processor_fn<F>(f: F) -> FnProcessor<F>
where
    F: Fn(Vec<u8>) -> std::result::Result<Vec<u8>, ProcessorError> + Send + Sync,
{
    FnProcessor(f)
}

/// Progress of a single secure call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    AwaitingSession,
    Decrypting,
    Processing,
    Encrypting,
    Complete,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::AwaitingSession => "awaiting-session",
            CallState::Decrypting => "decrypting",
            CallState::Processing => "processing",
            CallState::Encrypting => "encrypting",
            CallState::Complete => "complete",
        };
        f.write_str(name)
    }
}

pub struct SecureCallHandler {
    store: Arc<SessionStore>,
    processor: Arc<dyn MessageProcessor>,
    key_schedule: KeySchedule,
}

impl SecureCallHandler {
    pub fn new(
        store: Arc<SessionStore>,
        processor: Arc<dyn MessageProcessor>,
        key_schedule: KeySchedule,
    ) -> Self {
        Self {
            store,
            processor,
            key_schedule,
        }
    }

    /// Open `sealed_request` under the session's request key, process it and
    /// seal the reply under the reply key.
    pub async fn handle(
        &self,
        session_id: Option<&str>,
        sealed_request: &[u8],
    ) -> Result<Vec<u8>> {
        let mut state = CallState::AwaitingSession;
        let result = self.run(&mut state, session_id, sealed_request).await;
        match &result {
            Ok(_) => tracing::trace!(state = %state, "secure call finished"),
            Err(e) => tracing::debug!(state = %state, error = %e, "secure call failed"),
        }
        result
    }

    async fn run(
        &self,
        state: &mut CallState,
        session_id: Option<&str>,
        sealed_request: &[u8],
    ) -> Result<Vec<u8>> {
        let id = session_id
            .and_then(SessionId::parse)
            .ok_or(SecureRpcError::SessionNotFound)?;
        let session = self.store.lookup(&id)?;

        advance(state, CallState::Decrypting);
        let request_key = self.key_schedule.request_key(session.root_secret(), &id);
        let request = match MessageCipher::new(&request_key).open(sealed_request) {
            Ok(plaintext) => {
                self.store.record_auth_success(&session);
                plaintext
            }
            Err(e) => {
                if !self.store.record_auth_failure(&session) {
                    tracing::debug!(
                        session_id = %id,
                        failures = session.auth_failures(),
                        "request failed to open"
                    );
                }
                return Err(e);
            }
        };

        advance(state, CallState::Processing);
        let reply = match AssertUnwindSafe(self.processor.process(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(SecureRpcError::Processor(e.to_string())),
            Err(_) => return Err(SecureRpcError::Processor("processor panicked".to_string())),
        };

        advance(state, CallState::Encrypting);
        let reply_key = self.key_schedule.reply_key(session.root_secret(), &id);
        let sealed = MessageCipher::new(&reply_key).seal(&reply)?;

        advance(state, CallState::Complete);
        Ok(sealed)
    }
}

fn advance(state: &mut CallState, next: CallState) {
    tracing::trace!(from = %state, to = %next, "call state");
    *state = next;
}
