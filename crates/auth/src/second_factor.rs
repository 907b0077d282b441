//! Second-factor (step-up) session state.
//!
//! State per session id:
//!
//! ```text
//! UNVERIFIED --verify--> VERIFIED --ttl elapses--> EXPIRED (observed as unverified)
//!      ^                     |                          |
//!      +------ clear --------+-------- verify ----------+
//! ```
//!
//! Expiry is resolved lazily: the first read that sees `now >= expires_at`
//! clears the stored flag. There is no background sweep.
//!
//! Per-session locks only exist while a write is in flight, so the lock map
//! stays bounded by the number of concurrent writers.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use astrocat_core::SessionId;

/// Stored second-factor record for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondFactorSession {
    pub verified: bool,
    pub verified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SecondFactorSession {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.verified && now < self.expires_at
    }
}

/// Observable second-factor state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SecondFactorState {
    /// Never verified in this session (or cleared on logout).
    Unverified,
    Verified { expires_at: DateTime<Utc> },
    /// Was verified, but the TTL has elapsed.
    Expired { expired_at: DateTime<Utc> },
}

impl SecondFactorState {
    pub fn is_verified(&self) -> bool {
        matches!(self, SecondFactorState::Verified { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

/// Key/value store for second-factor records, keyed by session id.
///
/// Backed by the request session store owned by the transport layer.
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: SessionId) -> Result<Option<SecondFactorSession>, SessionStoreError>;
    fn set(&self, session_id: SessionId, record: SecondFactorSession) -> Result<(), SessionStoreError>;
    fn delete(&self, session_id: SessionId) -> Result<(), SessionStoreError>;
}

impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    fn get(&self, session_id: SessionId) -> Result<Option<SecondFactorSession>, SessionStoreError> {
        (**self).get(session_id)
    }

    fn set(&self, session_id: SessionId, record: SecondFactorSession) -> Result<(), SessionStoreError> {
        (**self).set(session_id, record)
    }

    fn delete(&self, session_id: SessionId) -> Result<(), SessionStoreError> {
        (**self).delete(session_id)
    }
}

/// In-memory session store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: DashMap<SessionId, SecondFactorSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: SessionId) -> Result<Option<SecondFactorSession>, SessionStoreError> {
        Ok(self.records.get(&session_id).map(|r| *r))
    }

    fn set(&self, session_id: SessionId, record: SecondFactorSession) -> Result<(), SessionStoreError> {
        self.records.insert(session_id, record);
        Ok(())
    }

    fn delete(&self, session_id: SessionId) -> Result<(), SessionStoreError> {
        self.records.remove(&session_id);
        Ok(())
    }
}

/// Second-factor session lifecycle on top of a [`SessionStore`].
///
/// Every write runs under a per-session mutex, and clearing an expired flag
/// re-reads the record under it, so a `mark_verified` racing an
/// expiry-clearing read on the same session cannot lose the update.
/// Different sessions never share a lock.
pub struct SecondFactorSessions {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SecondFactorSessions {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            locks: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record a successful TOTP check. Overwrites any previous record.
    pub fn mark_verified(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<SecondFactorSession, SessionStoreError> {
        let record = SecondFactorSession {
            verified: true,
            verified_at: now,
            expires_at: now + self.ttl,
        };
        self.with_lock(session_id, || self.store.set(session_id, record))?;
        Ok(record)
    }

    /// Current state, clearing the stored flag when expiry is observed.
    ///
    /// Store failures are reported as unverified.
    pub fn state(&self, session_id: SessionId, now: DateTime<Utc>) -> SecondFactorState {
        let record = match self.store.get(session_id) {
            Ok(Some(record)) => record,
            Ok(None) => return SecondFactorState::Unverified,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "second-factor lookup failed; treating as unverified");
                return SecondFactorState::Unverified;
            }
        };

        if record.is_live(now) {
            return SecondFactorState::Verified {
                expires_at: record.expires_at,
            };
        }

        if record.verified {
            self.clear_expired(session_id, now);
        }

        SecondFactorState::Expired {
            expired_at: record.expires_at,
        }
    }

    pub fn is_verified(&self, session_id: SessionId, now: DateTime<Utc>) -> bool {
        self.state(session_id, now).is_verified()
    }

    /// Whole seconds until expiry, rounded up; `0` once expired or when never
    /// verified.
    pub fn remaining_seconds(&self, session_id: SessionId, now: DateTime<Utc>) -> i64 {
        match self.state(session_id, now) {
            SecondFactorState::Verified { expires_at } => seconds_until(expires_at, now),
            SecondFactorState::Unverified | SecondFactorState::Expired { .. } => 0,
        }
    }

    /// Explicit invalidation (logout).
    pub fn clear(&self, session_id: SessionId) -> Result<(), SessionStoreError> {
        self.with_lock(session_id, || self.store.delete(session_id))
    }

    /// Sessions that currently hold a per-session lock.
    pub fn tracked_sessions(&self) -> usize {
        self.locks.len()
    }

    /// Re-check under the lock so a concurrent `mark_verified` is not undone.
    fn clear_expired(&self, session_id: SessionId, now: DateTime<Utc>) {
        self.with_lock(session_id, || match self.store.get(session_id) {
            Ok(Some(record)) if record.verified && !record.is_live(now) => {
                let cleared = SecondFactorSession {
                    verified: false,
                    ..record
                };
                if let Err(e) = self.store.set(session_id, cleared) {
                    tracing::warn!(%session_id, error = %e, "failed to clear expired second-factor flag");
                }
                tracing::debug!(%session_id, expired_at = %record.expires_at, "second-factor session expired");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "second-factor lookup failed while clearing expiry");
            }
        });
    }

    /// Run `f` under the session's mutex. The entry is dropped afterwards
    /// unless another caller is still holding or waiting on it.
    fn with_lock<T>(&self, session_id: SessionId, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.entry(session_id).or_default().clone();
        let out = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);
        self.locks
            .remove_if(&session_id, |_, lock| Arc::strong_count(lock) == 1);
        out
    }
}

/// Whole seconds from `now` until `expires_at`, rounded up, never negative.
pub fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = expires_at - now;
    if remaining <= Duration::zero() {
        return 0;
    }
    (remaining + Duration::milliseconds(999)).num_seconds()
}

impl core::fmt::Debug for SecondFactorSessions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecondFactorSessions")
            .field("ttl", &self.ttl)
            .field("tracked_sessions", &self.tracked_sessions())
            .finish()
    }
}
