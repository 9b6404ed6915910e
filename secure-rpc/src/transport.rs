//! Transports carrying the two RPC operations between client and server.

use std::sync::Arc;

use async_trait::async_trait;
use bincode::Options;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::config::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::{Result, SecureRpcError, Status};
use crate::service::SecureService;
use crate::types::{KeyExchangeReply, KeyExchangeRequest, Metadata, SecureMessage};

/// Request/response call mechanism underneath a [`crate::SecureClient`].
///
/// A server-side rejection comes back as [`SecureRpcError::Rejected`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn key_exchange(&self, request: KeyExchangeRequest) -> Result<KeyExchangeReply>;

    async fn send_secure(&self, message: SecureMessage, metadata: Metadata)
        -> Result<SecureMessage>;
}

/// In-process transport that calls straight into a [`SecureService`].
#[derive(Clone)]
pub struct LoopbackTransport {
    service: Arc<SecureService>,
}

impl LoopbackTransport {
    pub fn new(service: Arc<SecureService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<SecureService> {
        &self.service
    }
}

#[async_trait]
impl RpcTransport for LoopbackTransport {
    async fn key_exchange(&self, request: KeyExchangeRequest) -> Result<KeyExchangeReply> {
        self.service
            .key_exchange(request)
            .map_err(SecureRpcError::Rejected)
    }

    async fn send_secure(
        &self,
        message: SecureMessage,
        metadata: Metadata,
    ) -> Result<SecureMessage> {
        self.service
            .send_secure(message, &metadata)
            .await
            .map_err(SecureRpcError::Rejected)
    }
}

/// Call envelope on a framed stream. The server echoes `call_id` in the
/// matching [`RpcResponse`].
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub call_id: u64,
    pub call: RpcCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RpcCall {
    KeyExchange(KeyExchangeRequest),
    SendSecure {
        message: SecureMessage,
        metadata: Metadata,
    },
}

/// Reply envelope on a framed stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub call_id: u64,
    pub reply: RpcReply,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RpcReply {
    KeyExchange(std::result::Result<KeyExchangeReply, Status>),
    SendSecure(std::result::Result<SecureMessage, Status>),
}

impl RpcReply {
    fn kind(&self) -> &'static str {
        match self {
            RpcReply::KeyExchange(_) => "KeyExchange",
            RpcReply::SendSecure(_) => "SendSecure",
        }
    }
}

fn rpc_bincode(max_message_size: usize) -> impl Options {
    bincode::DefaultOptions::new().with_limit(max_message_size as u64)
}

fn framed<S>(socket: S, max_message_size: usize) -> Framed<S, LengthDelimitedCodec>
where
    S: AsyncRead + AsyncWrite,
{
    let mut codec = LengthDelimitedCodec::new();
    codec.set_max_frame_length(max_message_size);
    Framed::new(socket, codec)
}

struct CallStream<S> {
    framed: Framed<S, LengthDelimitedCodec>,
    next_call_id: u64,
}

/// Client end of a length-delimited, bincode-encoded stream. Calls on one
/// transport are serialized: each request waits for its response.
///
/// A call dropped while waiting leaves its reply on the stream; the next
/// call skips replies with an older `call_id`.
pub struct FramedTransport<S> {
    stream: Mutex<CallStream<S>>,
    max_message_size: usize,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(socket: S) -> Self {
        Self::with_max_message_size(socket, DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(socket: S, max_message_size: usize) -> Self {
        Self {
            stream: Mutex::new(CallStream {
                framed: framed(socket, max_message_size),
                next_call_id: 0,
            }),
            max_message_size,
        }
    }

    async fn call(&self, call: RpcCall) -> Result<RpcReply> {
        let mut stream = self.stream.lock().await;
        let call_id = stream.next_call_id;
        stream.next_call_id += 1;

        let bytes = rpc_bincode(self.max_message_size).serialize(&RpcRequest { call_id, call })?;
        stream.framed.send(Bytes::from(bytes)).await?;

        loop {
            let frame = stream
                .framed
                .next()
                .await
                .ok_or(SecureRpcError::ConnectionClosed)??;
            let response: RpcResponse = rpc_bincode(self.max_message_size).deserialize(&frame)?;
            if response.call_id == call_id {
                return Ok(response.reply);
            }
            if response.call_id > call_id {
                return Err(SecureRpcError::ProtocolViolation(format!(
                    "reply to call {} while waiting for {}",
                    response.call_id, call_id
                )));
            }
            tracing::debug!(
                call_id = response.call_id,
                waiting_for = call_id,
                "discarding reply to abandoned call"
            );
        }
    }
}

#[async_trait]
impl<S> RpcTransport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn key_exchange(&self, request: KeyExchangeRequest) -> Result<KeyExchangeReply> {
        match self.call(RpcCall::KeyExchange(request)).await? {
            RpcReply::KeyExchange(reply) => reply.map_err(SecureRpcError::Rejected),
            other => Err(unexpected("KeyExchange", &other)),
        }
    }

    async fn send_secure(
        &self,
        message: SecureMessage,
        metadata: Metadata,
    ) -> Result<SecureMessage> {
        match self
            .call(RpcCall::SendSecure { message, metadata })
            .await?
        {
            RpcReply::SendSecure(reply) => reply.map_err(SecureRpcError::Rejected),
            other => Err(unexpected("SendSecure", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &RpcReply) -> SecureRpcError {
    SecureRpcError::ProtocolViolation(format!(
        "expected {} response, got {}",
        expected,
        got.kind()
    ))
}

/// Answer calls arriving on `socket` until the peer hangs up.
///
/// A frame that fails to decode ends the connection; the sessions it may
/// have created stay in the service's store.
pub async fn serve_connection<S>(service: Arc<SecureService>, socket: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let max_message_size = service.config().max_message_size;
    let mut stream = framed(socket, max_message_size);

    while let Some(frame) = stream.next().await {
        let request: RpcRequest = rpc_bincode(max_message_size).deserialize(&frame?)?;
        let reply = match request.call {
            RpcCall::KeyExchange(request) => RpcReply::KeyExchange(service.key_exchange(request)),
            RpcCall::SendSecure { message, metadata } => {
                RpcReply::SendSecure(service.send_secure(message, &metadata).await)
            }
        };
        let response = RpcResponse {
            call_id: request.call_id,
            reply,
        };
        let bytes = rpc_bincode(max_message_size).serialize(&response)?;
        stream.send(Bytes::from(bytes)).await?;
    }

    if service.config().verbose_logging {
        tracing::debug!("connection closed by peer");
    }
    Ok(())
}
