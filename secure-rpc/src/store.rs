//! Server-side session registry.
//!
//! Sessions live in a fixed number of shards, each behind its own
//! `RwLock`, so calls against unrelated sessions rarely contend. Expiry is
//! checked lazily on lookup; nothing runs in the background.

use std::collections::hash_map::{Entry, RandomState};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crypto::RootSecret;
use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::config::SecureRpcConfig;
use crate::error::{Result, SecureRpcError};
use crate::types::SessionId;

/// A root secret bound to an identifier, valid for the store's TTL.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    root_secret: RootSecret,
    created_at: SystemTime,
    auth_failures: AtomicU32,
}

impl Session {
    fn new(id: SessionId, root_secret: RootSecret, created_at: SystemTime) -> Self {
        Self {
            id,
            root_secret,
            created_at,
            auth_failures: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn root_secret(&self) -> &RootSecret {
        &self.root_secret
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Consecutive failed opens since the last successful one.
    pub fn auth_failures(&self) -> u32 {
        self.auth_failures.load(Ordering::Relaxed)
    }
}

type Shard = RwLock<HashMap<SessionId, Arc<Session>>>;

pub struct SessionStore {
    shards: Box<[Shard]>,
    hasher: RandomState,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_auth_failures: Option<u32>,
    verbose_logging: bool,
}

impl SessionStore {
    pub fn new(config: &SecureRpcConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &SecureRpcConfig, clock: Arc<dyn Clock>) -> Self {
        // A zero or non-power-of-two count would break shard masking.
        let shard_count = config.session_shards.max(1).next_power_of_two();
        let shards = (0..shard_count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
            clock,
            ttl: config.session_ttl,
            max_auth_failures: config.max_auth_failures,
            verbose_logging: config.verbose_logging,
        }
    }

    fn shard(&self, id: &SessionId) -> &Shard {
        let index = self.hasher.hash_one(id) as usize & (self.shards.len() - 1);
        &self.shards[index]
    }

    fn is_expired(&self, session: &Session, now: SystemTime) -> bool {
        // A clock that stepped backwards counts as zero age.
        let age = now
            .duration_since(session.created_at)
            .unwrap_or(Duration::ZERO);
        age >= self.ttl
    }

    /// Register a new session. Never overwrites an existing id.
    pub fn create(&self, id: SessionId, root_secret: RootSecret) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(id.clone(), root_secret, self.clock.now()));
        match self.shard(&id).write().entry(id) {
            Entry::Occupied(_) => return Err(SecureRpcError::SessionCollision),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        if self.verbose_logging {
            tracing::debug!(session_id = %session.id, "session created");
        }
        Ok(session)
    }

    /// Fetch a live session. An expired session is removed and reported as
    /// [`SecureRpcError::SessionExpired`].
    pub fn lookup(&self, id: &SessionId) -> Result<Arc<Session>> {
        let shard = self.shard(id);
        let session = shard
            .read()
            .get(id)
            .cloned()
            .ok_or(SecureRpcError::SessionNotFound)?;

        if !self.is_expired(&session, self.clock.now()) {
            return Ok(session);
        }

        self.remove_exact(shard, &session);
        tracing::debug!(session_id = %id, "session expired");
        Err(SecureRpcError::SessionExpired)
    }

    /// Remove `session` only if the slot still holds that same session.
    fn remove_exact(&self, shard: &Shard, session: &Arc<Session>) -> bool {
        let mut guard = shard.write();
        match guard.get(&session.id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                guard.remove(&session.id);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        let removed = self.shard(id).write().remove(id).is_some();
        if removed && self.verbose_logging {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    /// Count a failed open against `session`; drops the session once the
    /// configured limit is reached. Returns true if it was dropped.
    pub fn record_auth_failure(&self, session: &Arc<Session>) -> bool {
        let failures = session.auth_failures.fetch_add(1, Ordering::AcqRel) + 1;
        match self.max_auth_failures {
            Some(limit) if failures >= limit => {
                let removed = self.remove_exact(self.shard(&session.id), session);
                if removed {
                    tracing::warn!(
                        session_id = %session.id,
                        failures,
                        "session dropped after repeated authentication failures"
                    );
                }
                removed
            }
            _ => false,
        }
    }

    pub fn record_auth_success(&self, session: &Session) {
        session.auth_failures.store(0, Ordering::Release);
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            let before = guard.len();
            guard.retain(|_, session| !self.is_expired(session, now));
            purged += before - guard.len();
        }
        if purged > 0 {
            tracing::debug!(purged, "purged expired sessions");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().clear();
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("shards", &self.shards.len())
            .field("sessions", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
