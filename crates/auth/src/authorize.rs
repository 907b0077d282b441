use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use astrocat_core::PrincipalId;

use crate::clock::Clock;
use crate::evaluator::{self, Evaluation, PredicateCheck, RecordScope, ResourceContext};
use crate::second_factor::{SecondFactorSessions, SecondFactorState};
use crate::{Action, ActionRequirements, Caller, ResourceKind, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    /// Fail-closed default for actions the requirement table does not know.
    #[error("forbidden: no authorization rule for '{action}' on '{resource}'")]
    Unmapped { resource: String, action: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("forbidden: second-factor required")]
    SecondFactorRequired,

    #[error("forbidden: second-factor session expired, verify again")]
    SecondFactorExpired,
}

impl AuthzError {
    pub fn http_status(&self) -> u16 {
        match self {
            AuthzError::Unauthenticated => 401,
            AuthzError::Unmapped { .. }
            | AuthzError::Forbidden { .. }
            | AuthzError::SecondFactorRequired
            | AuthzError::SecondFactorExpired => 403,
        }
    }

    pub fn kind(&self) -> DenialKind {
        match self {
            AuthzError::Unauthenticated => DenialKind::Unauthenticated,
            AuthzError::Unmapped { .. } => DenialKind::UnmappedAction,
            AuthzError::Forbidden { .. } => DenialKind::MissingPredicate,
            AuthzError::SecondFactorRequired => DenialKind::SecondFactorRequired,
            AuthzError::SecondFactorExpired => DenialKind::SecondFactorExpired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    UnmappedAction,
    MissingPredicate,
    SecondFactorRequired,
    SecondFactorExpired,
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub resource: String,
    pub action: String,
    pub granted: bool,
    /// Human-readable reason for the decision.
    pub reason: String,
    pub principal: Option<PrincipalState>,
    /// Predicates in the order they were evaluated.
    pub checks: Vec<PredicateCheck>,
    pub second_factor: Option<SecondFactorState>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub role: Option<Role>,
    pub is_superuser: bool,
    pub explicit_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gate
// ─────────────────────────────────────────────────────────────────────────────

/// Per-operation authorization dispatcher.
///
/// Stateless apart from the stores it reads: every call re-evaluates the
/// principal's grants and the session's second-factor state.
pub struct AuthorizationGate {
    requirements: ActionRequirements,
    sessions: Arc<SecondFactorSessions>,
    clock: Arc<dyn Clock>,
}

impl AuthorizationGate {
    pub fn new(requirements: ActionRequirements, sessions: Arc<SecondFactorSessions>, clock: Arc<dyn Clock>) -> Self {
        Self {
            requirements,
            sessions,
            clock,
        }
    }

    pub fn requirements(&self) -> &ActionRequirements {
        &self.requirements
    }

    /// Authorize `action` on `resource` for the caller.
    ///
    /// - No IO beyond the session store lookup
    /// - No panics
    /// - Unmapped actions are denied
    #[instrument(skip_all, fields(%resource, %action))]
    pub fn authorize(
        &self,
        caller: Option<&Caller>,
        action: Action,
        resource: ResourceKind,
        context: &ResourceContext,
    ) -> Result<(), AuthzError> {
        let result = self.evaluate(caller, action, resource, context).verdict;
        log_decision(caller, &result);
        result
    }

    /// Same as [`authorize`](Self::authorize) for names coming off the wire.
    ///
    /// Names that do not parse are treated as unmapped.
    pub fn authorize_named(
        &self,
        caller: Option<&Caller>,
        action: &str,
        resource: &str,
        context: &ResourceContext,
    ) -> Result<(), AuthzError> {
        match (action.parse::<Action>(), resource.parse::<ResourceKind>()) {
            (Ok(action), Ok(resource)) => self.authorize(caller, action, resource, context),
            _ => {
                let err = unauthenticated_or(caller, || AuthzError::Unmapped {
                    resource: resource.to_string(),
                    action: action.to_string(),
                });
                log_decision(caller, &Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Explain why an authorization decision was made (or would be made).
    pub fn explain(
        &self,
        caller: Option<&Caller>,
        action: Action,
        resource: ResourceKind,
        context: &ResourceContext,
    ) -> AuthorizationExplanation {
        let evaluation = self.evaluate(caller, action, resource, context);
        explanation(caller, resource.to_string(), action.to_string(), evaluation)
    }

    /// Same as [`explain`](Self::explain) for names coming off the wire.
    ///
    /// Names that do not parse are explained as unmapped.
    pub fn explain_named(
        &self,
        caller: Option<&Caller>,
        action: &str,
        resource: &str,
        context: &ResourceContext,
    ) -> AuthorizationExplanation {
        match (action.parse::<Action>(), resource.parse::<ResourceKind>()) {
            (Ok(action), Ok(resource)) => self.explain(caller, action, resource, context),
            _ => {
                let err = unauthenticated_or(caller, || AuthzError::Unmapped {
                    resource: resource.to_string(),
                    action: action.to_string(),
                });
                explanation(caller, resource.to_string(), action.to_string(), denied(err))
            }
        }
    }

    /// Which records of `resource` the caller may see in listings.
    pub fn record_scope(&self, caller: Option<&Caller>, resource: ResourceKind) -> RecordScope {
        RecordScope::for_principal(caller.map(|c| &c.principal), resource)
    }

    fn evaluate(
        &self,
        caller: Option<&Caller>,
        action: Action,
        resource: ResourceKind,
        context: &ResourceContext,
    ) -> Evaluation {
        let Some(caller) = caller else {
            return denied(AuthzError::Unauthenticated);
        };

        let Some(requirement) = self.requirements.get(resource, action) else {
            return denied(AuthzError::Unmapped {
                resource: resource.to_string(),
                action: action.to_string(),
            });
        };

        evaluator::evaluate(&caller.principal, requirement, context, || {
            self.sessions.state(caller.session_id, self.clock.now())
        })
    }
}

impl core::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("rules", &self.requirements.len())
            .field("sessions", &self.sessions)
            .finish()
    }
}

fn explanation(
    caller: Option<&Caller>,
    resource: String,
    action: String,
    evaluation: Evaluation,
) -> AuthorizationExplanation {
    let principal = caller.map(|c| PrincipalState {
        principal_id: c.principal.id,
        role: c.principal.role,
        is_superuser: c.principal.is_superuser,
        explicit_permissions: c
            .principal
            .explicit_permissions
            .iter()
            .map(|p| p.as_str().to_string())
            .collect(),
    });

    let (granted, reason, denial_reason) = match &evaluation.verdict {
        Ok(()) => {
            let reason = evaluation
                .checks
                .iter()
                .rev()
                .find(|c| c.passed)
                .map(|c| format!("granted by {}: {}", c.predicate, c.detail))
                .unwrap_or_else(|| "granted".to_string());
            (true, reason, None)
        }
        Err(err) => (
            false,
            err.to_string(),
            Some(DenialReason {
                kind: err.kind(),
                message: err.to_string(),
                suggestions: suggestions(err, &evaluation.checks),
            }),
        ),
    };

    AuthorizationExplanation {
        resource,
        action,
        granted,
        reason,
        principal,
        checks: evaluation.checks,
        second_factor: evaluation.second_factor,
        denial_reason,
    }
}

fn denied(err: AuthzError) -> Evaluation {
    Evaluation {
        checks: Vec::new(),
        second_factor: None,
        verdict: Err(err),
    }
}

fn unauthenticated_or<F>(caller: Option<&Caller>, otherwise: F) -> AuthzError
where
    F: FnOnce() -> AuthzError,
{
    if caller.is_some() {
        otherwise()
    } else {
        AuthzError::Unauthenticated
    }
}

fn log_decision(caller: Option<&Caller>, result: &Result<(), AuthzError>) {
    let principal_id = caller.map(|c| c.principal.id.to_string());
    match result {
        Ok(()) => tracing::debug!(principal_id, "authorized"),
        Err(e) => tracing::info!(principal_id, denial = ?e.kind(), reason = %e, "authorization denied"),
    }
}

fn suggestions(err: &AuthzError, checks: &[PredicateCheck]) -> Vec<String> {
    match err {
        AuthzError::Unauthenticated => vec!["Sign in before calling this operation".to_string()],
        AuthzError::Unmapped { .. } => {
            vec!["This action is not defined for the resource; unmapped actions are always denied".to_string()]
        }
        AuthzError::Forbidden { .. } => checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("Satisfy {} ({})", c.predicate, c.detail))
            .collect(),
        AuthzError::SecondFactorRequired => {
            vec!["Submit a TOTP code to verify the second factor for this session".to_string()]
        }
        AuthzError::SecondFactorExpired => {
            vec!["The second-factor window has elapsed; submit a fresh TOTP code".to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    use astrocat_core::SessionId;

    use super::*;
    use crate::clock::ManualClock;
    use crate::second_factor::InMemorySessionStore;
    use crate::{ActionRequirement, Permission, Principal, grants};

    struct Fixture {
        clock: Arc<ManualClock>,
        sessions: Arc<SecondFactorSessions>,
        gate: AuthorizationGate,
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn fixture_with(requirements: ActionRequirements) -> Fixture {
        let clock = Arc::new(ManualClock::new(start()));
        let sessions = Arc::new(SecondFactorSessions::new(
            InMemorySessionStore::arc(),
            Duration::seconds(900),
        ));
        let gate = AuthorizationGate::new(requirements, sessions.clone(), clock.clone());
        Fixture { clock, sessions, gate }
    }

    fn fixture() -> Fixture {
        fixture_with(ActionRequirements::standard())
    }

    fn caller(principal: Principal) -> Caller {
        Caller::new(principal, SessionId::new())
    }

    fn researcher() -> Caller {
        caller(Principal::new(PrincipalId::new(), "rhea").with_role(Role::Researcher))
    }

    #[test]
    fn unauthenticated_is_denied_before_anything_else() {
        let f = fixture();
        for kind in ResourceKind::ALL {
            for action in Action::ALL {
                assert_eq!(
                    f.gate.authorize(None, action, kind, &ResourceContext::none()),
                    Err(AuthzError::Unauthenticated)
                );
            }
        }
        assert_eq!(
            f.gate.authorize_named(None, "purge", "galaxy", &ResourceContext::none()),
            Err(AuthzError::Unauthenticated)
        );
    }

    #[test]
    fn unmapped_pairs_are_denied() {
        let f = fixture();
        let root = caller(Principal::new(PrincipalId::new(), "root").superuser());
        let err = f
            .gate
            .authorize(Some(&root), Action::ListOwn, ResourceKind::Observatory, &ResourceContext::none())
            .unwrap_err();
        assert!(matches!(err, AuthzError::Unmapped { .. }));
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn unparsable_names_are_denied_not_errors() {
        let f = fixture();
        let c = researcher();
        let err = f
            .gate
            .authorize_named(Some(&c), "purge", "observation", &ResourceContext::none())
            .unwrap_err();
        assert_eq!(
            err,
            AuthzError::Unmapped {
                resource: "observation".to_string(),
                action: "purge".to_string()
            }
        );
    }

    #[test]
    fn researcher_update_needs_fresh_second_factor() {
        let f = fixture();
        let c = researcher();
        let ctx = ResourceContext::none();

        assert_eq!(
            f.gate.authorize(Some(&c), Action::Update, ResourceKind::Observation, &ctx),
            Err(AuthzError::SecondFactorRequired)
        );

        f.sessions.mark_verified(c.session_id, f.clock.now()).unwrap();
        assert_eq!(
            f.gate.authorize(Some(&c), Action::Update, ResourceKind::Observation, &ctx),
            Ok(())
        );

        f.clock.advance(Duration::seconds(901));
        assert_eq!(
            f.gate.authorize(Some(&c), Action::Update, ResourceKind::Observation, &ctx),
            Err(AuthzError::SecondFactorExpired)
        );
    }

    #[test]
    fn second_factor_is_per_session() {
        let f = fixture();
        let c = researcher();
        let other_device = Caller::new(c.principal.clone(), SessionId::new());
        f.sessions.mark_verified(c.session_id, f.clock.now()).unwrap();

        let ctx = ResourceContext::none();
        assert!(f.gate.authorize(Some(&c), Action::Delete, ResourceKind::Astronomer, &ctx).is_ok());
        assert_eq!(
            f.gate.authorize(Some(&other_device), Action::Delete, ResourceKind::Astronomer, &ctx),
            Err(AuthzError::SecondFactorRequired)
        );
    }

    #[test]
    fn admin_needs_explicit_grant_to_create_astronomers() {
        let f = fixture();
        let mut c = caller(Principal::new(PrincipalId::new(), "ada").with_role(Role::Admin));
        let ctx = ResourceContext::none();

        let err = f
            .gate
            .authorize(Some(&c), Action::Create, ResourceKind::Astronomer, &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden {
                reason: "requires grant 'manage-astronomers'".to_string()
            }
        );

        c.principal.explicit_permissions.insert(grants::MANAGE_ASTRONOMERS);
        assert_eq!(f.gate.authorize(Some(&c), Action::Create, ResourceKind::Astronomer, &ctx), Ok(()));
    }

    #[test]
    fn read_only_actions_ignore_second_factor() {
        let f = fixture();
        let c = researcher();
        for kind in ResourceKind::ALL {
            assert!(f.gate.authorize(Some(&c), Action::List, kind, &ResourceContext::none()).is_ok());
        }
        let own = ResourceContext::owned_by(c.principal.id);
        assert!(f.gate.authorize(Some(&c), Action::Read, ResourceKind::Observation, &own).is_ok());
    }

    #[test]
    fn explanation_reports_checks_and_suggestions() {
        let f = fixture();
        let c = researcher();
        let explanation = f.gate.explain(
            Some(&c),
            Action::Update,
            ResourceKind::SpaceObject,
            &ResourceContext::none(),
        );

        assert!(!explanation.granted);
        assert_eq!(explanation.second_factor, Some(SecondFactorState::Unverified));
        assert_eq!(explanation.checks.len(), 2);
        assert!(explanation.checks[0].passed);
        assert!(!explanation.checks[1].passed);

        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::SecondFactorRequired);
        assert_eq!(denial.suggestions.len(), 1);
    }

    #[test]
    fn explanation_for_granted_request_names_the_predicate() {
        let f = fixture();
        let c = caller(
            Principal::new(PrincipalId::new(), "sam")
                .with_role(Role::Researcher)
                .with_grant(grants::SEE_STATISTICS),
        );
        let explanation = f.gate.explain(
            Some(&c),
            Action::Statistics,
            ResourceKind::Observatory,
            &ResourceContext::none(),
        );
        assert!(explanation.granted);
        assert!(explanation.reason.contains("grant 'see-statistics'"));
        assert!(explanation.denial_reason.is_none());
    }

    #[test]
    fn explaining_unparsable_names_reports_unmapped() {
        let f = fixture();
        let c = researcher();

        let explanation = f
            .gate
            .explain_named(Some(&c), "purge", "observation", &ResourceContext::none());
        assert!(!explanation.granted);
        assert_eq!(explanation.action, "purge");
        assert_eq!(explanation.denial_reason.unwrap().kind, DenialKind::UnmappedAction);

        let anonymous = f
            .gate
            .explain_named(None, "purge", "observation", &ResourceContext::none());
        assert_eq!(anonymous.denial_reason.unwrap().kind, DenialKind::Unauthenticated);

        let parsed = f
            .gate
            .explain_named(Some(&c), "list", "observation", &ResourceContext::none());
        assert!(parsed.granted);
    }

    fn arb_kind() -> impl Strategy<Value = ResourceKind> {
        prop::sample::select(ResourceKind::ALL.to_vec())
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop::sample::select(Action::ALL.to_vec())
    }

    fn arb_principal() -> impl Strategy<Value = Principal> {
        (
            prop::option::of(prop::sample::select(Role::ALL.to_vec())),
            prop::collection::vec("[a-z-]{1,20}", 0..4),
            any::<bool>(),
        )
            .prop_map(|(role, grants, superuser)| {
                let mut p = Principal::new(PrincipalId::new(), "prop");
                p.role = role;
                p.is_superuser = superuser;
                p.explicit_permissions = grants.into_iter().map(Permission::new).collect();
                p
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_global_rejects: 16384,
            .. ProptestConfig::default()
        })]

        #[test]
        fn empty_table_denies_everything(principal in arb_principal(), kind in arb_kind(), action in arb_action()) {
            let f = fixture_with(ActionRequirements::empty());
            let c = caller(principal);
            let denied = matches!(
                f.gate.authorize(Some(&c), action, kind, &ResourceContext::none()),
                Err(AuthzError::Unmapped { .. })
            );
            prop_assert!(denied);
        }

        #[test]
        fn pairs_missing_from_standard_table_are_denied(principal in arb_principal(), kind in arb_kind(), action in arb_action()) {
            let f = fixture();
            prop_assume!(f.gate.requirements().get(kind, action).is_none());
            let c = caller(principal);
            prop_assert!(f.gate.authorize(Some(&c), action, kind, &ResourceContext::none()).is_err());
        }

        #[test]
        fn superuser_bypasses_role_grant_and_second_factor(
            principal in arb_principal(),
            kind in arb_kind(),
            action in arb_action(),
            owner in prop::option::of(Just(PrincipalId::new())),
        ) {
            let f = fixture_with(ActionRequirements::standard().require(
                kind,
                action,
                ActionRequirement::role(Role::Admin).with_second_factor(),
            ));
            let mut principal = principal;
            principal.is_superuser = true;
            let c = caller(principal);
            let ctx = owner.map(ResourceContext::owned_by).unwrap_or_default();
            prop_assert_eq!(f.gate.authorize(Some(&c), action, kind, &ctx), Ok(()));
        }
    }
}
