//! Hybrid post-quantum encrypted channel over a request/response RPC
//! transport.
//!
//! Two peers run a single round-trip key exchange combining finite-field
//! Diffie-Hellman with ML-KEM-768, then protect every later payload with
//! AES-256-GCM under keys derived from the resulting root secret.
//!
//! # Security Properties
//!
//! - The root secret stays unpredictable while either the discrete log
//!   problem in the 2048-bit MODP group or ML-KEM remains hard.
//! - Neither peer is authenticated. An active attacker able to intercept
//!   the key exchange can sit in the middle; add an authentication layer
//!   if that matters.
//! - The initiator never confirms that its key matches the server's. A
//!   garbled reply surfaces as `Unauthenticated` on the first secure call.
//!
//! # Protocol Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  KeyExchange  {client_id, dh_pub, kem_pub}                     │
//! │            ◀─ {session_id, dh_pub, kem_ciphertext}             │
//! │  root = SHA256(dh_shared || kem_shared)                        │
//! ├───────────────────────────────────────────────────────────────┤
//! │  SendSecure   metadata: session-id                             │
//! │               body: nonce || AES-GCM(key(root, c2s), request)  │
//! │            ◀─ nonce || AES-GCM(key(root, s2c), reply)          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use secure_rpc::{
//!     EchoProcessor, LoopbackTransport, SecureClient, SecureRpcConfig, SecureService,
//! };
//!
//! let service = Arc::new(SecureService::new(SecureRpcConfig::default(), EchoProcessor)?);
//! let mut client = SecureClient::new(LoopbackTransport::new(service), SecureRpcConfig::default());
//!
//! let reply = client.send_str("Hello, secure world!").await?;
//! ```

pub mod cipher;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod kdf;
pub mod service;
pub mod store;
pub mod transport;
pub mod types;

pub use client::SecureClient;
pub use config::{SecureRpcConfig, SecureRpcConfigBuilder};
pub use error::{SecureRpcError, Status, StatusCode};
pub use handler::{processor_fn, EchoProcessor, MessageProcessor, ProcessorError};
pub use kdf::KeySchedule;
pub use service::SecureService;
pub use transport::{serve_connection, FramedTransport, LoopbackTransport, RpcTransport};
pub use types::{KeyExchangeReply, KeyExchangeRequest, Metadata, SecureMessage, SessionId};
