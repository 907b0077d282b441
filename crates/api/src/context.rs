use astrocat_auth::{Caller, PrincipalId};

/// Caller context for a request.
///
/// Always present on routed requests; anonymous when no bearer token was
/// supplied. Resolved once by the auth middleware.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    caller: Option<Caller>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(caller: Caller) -> Self {
        Self { caller: Some(caller) }
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub fn principal_id(&self) -> Option<PrincipalId> {
        self.caller.as_ref().map(Caller::principal_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.caller.is_some()
    }
}
