//! Process configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

use astrocat_auth::{PrincipalId, StepUpConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_BOOTSTRAP_USERNAME: &str = "admin";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API_BIND_ADDR is not a socket address: {0}")]
    InvalidBindAddr(String),

    #[error("SECOND_FACTOR_TTL_SECS must be a positive integer, got '{0}'")]
    InvalidTtl(String),

    #[error("BOOTSTRAP_SUPERUSER_ID is not a principal id: {0}")]
    InvalidBootstrapId(String),
}

/// Superuser upserted into the directory at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPrincipal {
    pub id: PrincipalId,
    pub username: String,
}

#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub step_up: StepUpConfig,
    /// Only honoured when built with the `redis` feature.
    pub redis_url: Option<String>,
    pub bootstrap_superuser: Option<BootstrapPrincipal>,
    /// JSON array of principals loaded into the directory at startup.
    pub directory_seed: Option<PathBuf>,
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("step_up", &self.step_up)
            .field("redis_url", &self.redis_url)
            .field("bootstrap_superuser", &self.bootstrap_superuser)
            .field("directory_seed", &self.directory_seed)
            .finish()
    }
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("API_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr.clone()))?;

        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.is_empty()).unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let mut step_up = StepUpConfig::default();
        if let Some(issuer) = lookup("TOTP_ISSUER").filter(|s| !s.trim().is_empty()) {
            step_up.issuer = issuer.trim().to_string();
        }
        if let Some(raw) = lookup("SECOND_FACTOR_TTL_SECS") {
            let secs = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| ConfigError::InvalidTtl(raw.clone()))?;
            step_up.second_factor_ttl = Duration::seconds(secs);
        }

        let redis_url = lookup("REDIS_URL").filter(|s| !s.trim().is_empty());

        let bootstrap_superuser = match lookup("BOOTSTRAP_SUPERUSER_ID").filter(|s| !s.trim().is_empty()) {
            Some(raw) => {
                let id = raw
                    .trim()
                    .parse::<PrincipalId>()
                    .map_err(|e| ConfigError::InvalidBootstrapId(e.to_string()))?;
                let username = lookup("BOOTSTRAP_SUPERUSER_NAME")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_BOOTSTRAP_USERNAME.to_string());
                Some(BootstrapPrincipal { id, username })
            }
            None => None,
        };

        let directory_seed = lookup("DIRECTORY_SEED_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(|s| PathBuf::from(s.trim()));

        Ok(Self {
            bind_addr,
            jwt_secret,
            step_up,
            redis_url,
            bootstrap_superuser,
            directory_seed,
        })
    }
}
