//! Role/profile store contract (the user-account directory).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use astrocat_core::PrincipalId;

use crate::{Permission, Principal, TotpSecret};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("principal not found: {0}")]
    NotFound(PrincipalId),

    #[error("directory storage error: {0}")]
    Storage(String),
}

/// User-account directory consumed by the authorization core.
pub trait PrincipalDirectory: Send + Sync {
    fn find(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError>;

    /// Insert or replace a principal.
    fn upsert(&self, principal: Principal) -> Result<(), DirectoryError>;

    fn store_totp_secret(&self, id: PrincipalId, secret: TotpSecret) -> Result<(), DirectoryError>;

    fn grant(&self, id: PrincipalId, permission: Permission) -> Result<(), DirectoryError>;

    fn revoke(&self, id: PrincipalId, permission: &Permission) -> Result<(), DirectoryError>;
}

impl<S> PrincipalDirectory for Arc<S>
where
    S: PrincipalDirectory + ?Sized,
{
    fn find(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        (**self).find(id)
    }

    fn upsert(&self, principal: Principal) -> Result<(), DirectoryError> {
        (**self).upsert(principal)
    }

    fn store_totp_secret(&self, id: PrincipalId, secret: TotpSecret) -> Result<(), DirectoryError> {
        (**self).store_totp_secret(id, secret)
    }

    fn grant(&self, id: PrincipalId, permission: Permission) -> Result<(), DirectoryError> {
        (**self).grant(id, permission)
    }

    fn revoke(&self, id: PrincipalId, permission: &Permission) -> Result<(), DirectoryError> {
        (**self).revoke(id, permission)
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    principals: RwLock<HashMap<PrincipalId, Principal>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn modify<F>(&self, id: PrincipalId, f: F) -> Result<(), DirectoryError>
    where
        F: FnOnce(&mut Principal),
    {
        let mut map = self.principals.write().map_err(poisoned)?;
        let principal = map.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        f(principal);
        Ok(())
    }
}

fn poisoned<T>(_: T) -> DirectoryError {
    DirectoryError::Storage("directory lock poisoned".to_string())
}

impl PrincipalDirectory for InMemoryDirectory {
    fn find(&self, id: PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        let map = self.principals.read().map_err(poisoned)?;
        Ok(map.get(&id).cloned())
    }

    fn upsert(&self, principal: Principal) -> Result<(), DirectoryError> {
        let mut map = self.principals.write().map_err(poisoned)?;
        map.insert(principal.id, principal);
        Ok(())
    }

    fn store_totp_secret(&self, id: PrincipalId, secret: TotpSecret) -> Result<(), DirectoryError> {
        self.modify(id, |p| p.totp_secret = Some(secret))
    }

    fn grant(&self, id: PrincipalId, permission: Permission) -> Result<(), DirectoryError> {
        self.modify(id, |p| {
            p.explicit_permissions.insert(permission);
        })
    }

    fn revoke(&self, id: PrincipalId, permission: &Permission) -> Result<(), DirectoryError> {
        self.modify(id, |p| {
            p.explicit_permissions.remove(permission);
        })
    }
}
