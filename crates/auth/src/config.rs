//! Step-up configuration.

use chrono::Duration;

/// Lifetime of a second-factor verification, applied to every endpoint.
pub const DEFAULT_SECOND_FACTOR_TTL_SECS: i64 = 900;

pub const DEFAULT_TOTP_ISSUER: &str = "SpaceCatalog";

#[derive(Debug, Clone)]
pub struct StepUpConfig {
    pub issuer: String,
    pub second_factor_ttl: Duration,
}

impl Default for StepUpConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_TOTP_ISSUER.to_string(),
            second_factor_ttl: Duration::seconds(DEFAULT_SECOND_FACTOR_TTL_SECS),
        }
    }
}
