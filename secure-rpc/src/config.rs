//! Configuration for the secure RPC layer

use std::time::Duration;

use crate::error::{Result, SecureRpcError};
use crate::kdf::KeySchedule;

/// Sessions older than this are refused.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Consecutive failed opens before a session is dropped.
pub const DEFAULT_MAX_AUTH_FAILURES: u32 = 5;

pub const DEFAULT_SESSION_SHARDS: usize = 16;

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Configuration shared by the client and the server side.
///
/// Both peers must agree on `key_schedule`.
#[derive(Clone, Debug)]
pub struct SecureRpcConfig {
    /// Lifetime of a session, measured from its creation
    pub session_ttl: Duration,

    /// Which derived keys protect requests and replies
    pub key_schedule: KeySchedule,

    /// Drop a session after this many consecutive authentication failures.
    /// `None` keeps the session regardless.
    pub max_auth_failures: Option<u32>,

    /// Number of independently locked session-table shards (power of two)
    pub session_shards: usize,

    /// Maximum size of one framed message on a stream transport
    pub max_message_size: usize,

    /// Whether to log detailed handshake information
    pub verbose_logging: bool,
}

impl Default for SecureRpcConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureRpcConfig {
    pub fn new() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            key_schedule: KeySchedule::default(),
            max_auth_failures: Some(DEFAULT_MAX_AUTH_FAILURES),
            session_shards: DEFAULT_SESSION_SHARDS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            verbose_logging: false,
        }
    }

    /// Single `"encryption"` key for both directions, wire compatible with
    /// peers that never adopted direction-scoped keys.
    pub fn shared_key() -> Self {
        Self::new().with_key_schedule(KeySchedule::Shared)
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_key_schedule(mut self, schedule: KeySchedule) -> Self {
        self.key_schedule = schedule;
        self
    }

    pub fn with_max_auth_failures(mut self, limit: Option<u32>) -> Self {
        self.max_auth_failures = limit;
        self
    }

    /// Enable verbose logging
    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_ttl.is_zero() {
            return Err(SecureRpcError::InvalidConfig(
                "session ttl must be non-zero".to_string(),
            ));
        }
        if self.session_shards == 0 || !self.session_shards.is_power_of_two() {
            return Err(SecureRpcError::InvalidConfig(format!(
                "session shard count must be a power of two, got {}",
                self.session_shards
            )));
        }
        if self.max_auth_failures == Some(0) {
            return Err(SecureRpcError::InvalidConfig(
                "max auth failures must be at least 1".to_string(),
            ));
        }
        if self.max_message_size < crate::cipher::MIN_SEALED_LEN {
            return Err(SecureRpcError::InvalidConfig(format!(
                "max message size {} cannot hold a sealed message",
                self.max_message_size
            )));
        }
        Ok(())
    }
}

/// Builder for SecureRpcConfig
pub struct SecureRpcConfigBuilder {
    config: SecureRpcConfig,
}

impl Default for SecureRpcConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureRpcConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SecureRpcConfig::new(),
        }
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    pub fn key_schedule(mut self, schedule: KeySchedule) -> Self {
        self.config.key_schedule = schedule;
        self
    }

    pub fn max_auth_failures(mut self, limit: Option<u32>) -> Self {
        self.config.max_auth_failures = limit;
        self
    }

    pub fn session_shards(mut self, shards: usize) -> Self {
        self.config.session_shards = shards;
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn verbose(mut self) -> Self {
        self.config.verbose_logging = true;
        self
    }

    /// Build the configuration, rejecting unusable values
    pub fn build(self) -> Result<SecureRpcConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
