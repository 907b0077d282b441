use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use astrocat_auth::{
    ActionRequirements, AuthorizationGate, Clock, InMemoryDirectory, InMemorySessionStore, Principal,
    PrincipalDirectory, SecondFactorSessions, SessionStore, StepUpConfig, StepUpService, SystemClock, TotpConfig,
    TotpManager,
};

use crate::config::ApiConfig;

/// The authorization core shared by all handlers.
pub struct AppServices {
    pub directory: Arc<dyn PrincipalDirectory>,
    pub gate: AuthorizationGate,
    pub step_up: StepUpService,
}

impl AppServices {
    pub fn new(
        step_up: &StepUpConfig,
        directory: Arc<dyn PrincipalDirectory>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = Arc::new(SecondFactorSessions::new(store, step_up.second_factor_ttl));
        let totp = TotpManager::new(TotpConfig::new(step_up.issuer.clone()));

        Self {
            gate: AuthorizationGate::new(ActionRequirements::standard(), sessions.clone(), clock.clone()),
            step_up: StepUpService::new(directory.clone(), totp, sessions, clock),
            directory,
        }
    }

    /// In-memory stores; used for dev runs and tests.
    pub fn in_memory(step_up: &StepUpConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(step_up, InMemoryDirectory::arc(), InMemorySessionStore::arc(), clock)
    }

    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let store = session_store(config)?;
        let directory = InMemoryDirectory::arc();
        seed_directory(directory.as_ref(), config)?;

        Ok(Self::new(&config.step_up, directory, store, Arc::new(SystemClock)))
    }
}

/// Load the seed file (if any), then the bootstrap superuser on top of it.
pub fn seed_directory(directory: &dyn PrincipalDirectory, config: &ApiConfig) -> anyhow::Result<()> {
    if let Some(path) = &config.directory_seed {
        let principals = read_seed(path)?;
        let count = principals.len();
        for principal in principals {
            directory.upsert(principal)?;
        }
        tracing::info!(path = %path.display(), count, "seeded principal directory");
    }

    if let Some(bootstrap) = &config.bootstrap_superuser {
        directory.upsert(Principal::new(bootstrap.id, bootstrap.username.clone()).superuser())?;
        tracing::info!(principal_id = %bootstrap.id, username = %bootstrap.username, "bootstrap superuser registered");
    }

    Ok(())
}

fn read_seed(path: &Path) -> anyhow::Result<Vec<Principal>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read directory seed {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid directory seed {}", path.display()))
}

#[cfg(feature = "redis")]
fn session_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    match &config.redis_url {
        Some(url) => {
            tracing::info!("second-factor sessions stored in redis");
            Ok(Arc::new(astrocat_infra::sessions::RedisSessionStore::new(url)?))
        }
        None => Ok(InMemorySessionStore::arc()),
    }
}

#[cfg(not(feature = "redis"))]
fn session_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but redis support is not compiled in; using in-memory sessions");
    }
    Ok(InMemorySessionStore::arc())
}
