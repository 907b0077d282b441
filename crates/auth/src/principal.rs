use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use astrocat_core::{PrincipalId, SessionId};

use crate::{Permission, Role, TotpSecret};

/// A user identity as held by the user-account directory.
///
/// `role` is an explicit tag resolved when the principal is loaded; nothing
/// in this crate infers a role from the presence of related records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    /// Account name shown in authenticator apps.
    pub username: String,
    pub role: Option<Role>,
    /// Bypasses every predicate check.
    pub is_superuser: bool,
    pub explicit_permissions: BTreeSet<Permission>,
    /// Written exclusively by the TOTP secret manager.
    #[serde(default, skip_serializing)]
    pub totp_secret: Option<TotpSecret>,
}

impl Principal {
    pub fn new(id: PrincipalId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            role: None,
            is_superuser: false,
            explicit_permissions: BTreeSet::new(),
            totp_secret: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_grant(mut self, permission: Permission) -> Self {
        self.explicit_permissions.insert(permission);
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn has_grant(&self, permission: &Permission) -> bool {
        self.explicit_permissions.contains(permission)
    }
}

/// An authenticated request identity: the principal plus the session its
/// second-factor state is keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub principal: Principal,
    pub session_id: SessionId,
}

impl Caller {
    pub fn new(principal: Principal, session_id: SessionId) -> Self {
        Self {
            principal,
            session_id,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.id
    }
}
