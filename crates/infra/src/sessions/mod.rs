//! Second-factor session persistence outside the process.
//!
//! Records are stored as JSON under `astrocat:second-factor:<session id>`.
//! Keys outlive the verification window by a retention period so a client
//! can still be told "expired" rather than "never verified".

use chrono::{DateTime, Duration, Utc};

use astrocat_auth::{SecondFactorSession, SessionStoreError};
use astrocat_core::SessionId;

#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::{RedisSessionStore, RedisSessionStoreError};

pub const KEY_PREFIX: &str = "astrocat:second-factor:";

/// How long an expired record stays readable by default.
pub const DEFAULT_RETENTION_SECS: i64 = 3_600;

pub fn session_key(session_id: SessionId) -> String {
    format!("{KEY_PREFIX}{session_id}")
}

pub fn encode(record: &SecondFactorSession) -> Result<String, SessionStoreError> {
    serde_json::to_string(record).map_err(|e| SessionStoreError::Corrupt(e.to_string()))
}

pub fn decode(raw: &str) -> Result<SecondFactorSession, SessionStoreError> {
    serde_json::from_str(raw).map_err(|e| SessionStoreError::Corrupt(e.to_string()))
}

/// Key lifetime in seconds: the rest of the window plus `retention`,
/// never less than one second.
pub fn key_ttl_seconds(record: &SecondFactorSession, retention: Duration, now: DateTime<Utc>) -> u64 {
    let secs = (record.expires_at + retention - now).num_seconds();
    u64::try_from(secs).unwrap_or(0).max(1)
}
