use std::sync::Arc;

use chrono::Duration;
use redis::Commands;
use thiserror::Error;

use astrocat_auth::{Clock, SecondFactorSession, SessionStore, SessionStoreError, SystemClock};
use astrocat_core::SessionId;

use super::{DEFAULT_RETENTION_SECS, decode, encode, key_ttl_seconds, session_key};

#[derive(Debug, Error)]
pub enum RedisSessionStoreError {
    #[error("invalid redis url: {0}")]
    InvalidUrl(String),
}

/// Redis-backed [`SessionStore`].
///
/// Opens a connection per call (sync client). Per-session serialization is
/// provided by `SecondFactorSessions` within one process only.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisSessionStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RedisSessionStoreError> {
        let client =
            redis::Client::open(redis_url.as_ref()).map_err(|e| RedisSessionStoreError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client,
            retention: Duration::seconds(DEFAULT_RETENTION_SECS),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn connection(&self) -> Result<redis::Connection, SessionStoreError> {
        self.client
            .get_connection()
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))
    }
}

impl core::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: redis::RedisError) -> SessionStoreError {
    SessionStoreError::Unavailable(e.to_string())
}

impl SessionStore for RedisSessionStore {
    fn get(&self, session_id: SessionId) -> Result<Option<SecondFactorSession>, SessionStoreError> {
        let mut conn = self.connection()?;
        let raw: Option<String> = conn.get(session_key(session_id)).map_err(unavailable)?;
        raw.as_deref().map(decode).transpose()
    }

    fn set(&self, session_id: SessionId, record: SecondFactorSession) -> Result<(), SessionStoreError> {
        let payload = encode(&record)?;
        let ttl = key_ttl_seconds(&record, self.retention, self.clock.now());

        let mut conn = self.connection()?;
        let _: () = conn
            .set_ex(session_key(session_id), payload, ttl)
            .map_err(unavailable)?;

        tracing::debug!(%session_id, ttl, "stored second-factor record");
        Ok(())
    }

    fn delete(&self, session_id: SessionId) -> Result<(), SessionStoreError> {
        let mut conn = self.connection()?;
        let _: i64 = conn.del(session_key(session_id)).map_err(unavailable)?;
        Ok(())
    }
}
