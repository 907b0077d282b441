//! Permission evaluator: individual predicates and their composition.
//!
//! Composition for one requirement:
//!
//! 1. superuser ⇒ allow, nothing else is consulted;
//! 2. OR over the declared role / grant / ownership / authenticated predicates;
//! 3. if declared, AND the second-factor gate on top.

use serde::Serialize;

use astrocat_core::PrincipalId;

use crate::second_factor::SecondFactorState;
use crate::{ActionRequirement, AuthzError, Predicate, Principal, ResourceKind, Role};

/// Per-request facts about the record being acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceContext {
    owners: Vec<PrincipalId>,
}

impl ResourceContext {
    /// No record (collection-level actions such as create or list).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn owned_by(owner: PrincipalId) -> Self {
        Self { owners: vec![owner] }
    }

    /// Records such as observations have more than one owning party.
    pub fn with_owner(mut self, owner: PrincipalId) -> Self {
        if !self.owners.contains(&owner) {
            self.owners.push(owner);
        }
        self
    }

    pub fn owners(&self) -> &[PrincipalId] {
        &self.owners
    }

    pub fn is_owned_by(&self, principal: PrincipalId) -> bool {
        self.owners.contains(&principal)
    }
}

impl FromIterator<PrincipalId> for ResourceContext {
    fn from_iter<I: IntoIterator<Item = PrincipalId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with_owner)
    }
}

/// Outcome of one predicate, kept for explanations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateCheck {
    pub predicate: String,
    pub passed: bool,
    pub detail: String,
}

/// Full result of evaluating a requirement for a principal.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub checks: Vec<PredicateCheck>,
    /// `None` when the second-factor gate was not consulted.
    pub second_factor: Option<SecondFactorState>,
    pub verdict: Result<(), AuthzError>,
}

pub fn superuser_override(principal: &Principal) -> bool {
    principal.is_superuser
}

pub fn role_predicate(principal: &Principal, required: Role) -> bool {
    principal.has_role(required)
}

pub fn grant_predicate(principal: &Principal, required: &crate::Permission) -> bool {
    principal.has_grant(required)
}

pub fn ownership_predicate(principal: &Principal, context: &ResourceContext) -> bool {
    context.is_owned_by(principal.id)
}

fn check(principal: &Principal, predicate: &Predicate, context: &ResourceContext) -> PredicateCheck {
    let (passed, detail) = match predicate {
        Predicate::Role(role) => {
            let passed = role_predicate(principal, *role);
            let actual = principal.role.map_or("none", |r| r.as_str());
            (passed, format!("principal role is {actual}"))
        }
        Predicate::Grant(permission) => {
            let passed = grant_predicate(principal, permission);
            let detail = if passed {
                format!("'{permission}' is granted explicitly")
            } else {
                format!("'{permission}' is not among the principal's grants")
            };
            (passed, detail)
        }
        Predicate::Owner => {
            let passed = ownership_predicate(principal, context);
            let detail = if passed {
                "principal owns the record".to_string()
            } else if context.owners().is_empty() {
                "no owning principal in the resource context".to_string()
            } else {
                "record is owned by another principal".to_string()
            };
            (passed, detail)
        }
        Predicate::Authenticated => (true, "principal is authenticated".to_string()),
    };

    PredicateCheck {
        predicate: predicate.to_string(),
        passed,
        detail,
    }
}

/// Evaluate `requirement` for an authenticated principal.
///
/// `second_factor` is only invoked when the requirement declares the gate and
/// the principal is not a superuser.
pub fn evaluate<F>(
    principal: &Principal,
    requirement: &ActionRequirement,
    context: &ResourceContext,
    second_factor: F,
) -> Evaluation
where
    F: FnOnce() -> SecondFactorState,
{
    if superuser_override(principal) {
        return Evaluation {
            checks: vec![PredicateCheck {
                predicate: "superuser override".to_string(),
                passed: true,
                detail: "superusers bypass every predicate".to_string(),
            }],
            second_factor: None,
            verdict: Ok(()),
        };
    }

    let mut checks = Vec::with_capacity(requirement.predicates().len() + 1);
    let mut allowed = false;
    for predicate in requirement.predicates() {
        let outcome = check(principal, predicate, context);
        allowed |= outcome.passed;
        checks.push(outcome);
        if allowed {
            break;
        }
    }

    let second_factor_state = requirement.requires_second_factor().then(second_factor);
    if let Some(state) = second_factor_state {
        checks.push(PredicateCheck {
            predicate: "verified second factor".to_string(),
            passed: state.is_verified(),
            detail: match state {
                SecondFactorState::Verified { expires_at } => format!("verified until {expires_at}"),
                SecondFactorState::Expired { expired_at } => format!("verification expired at {expired_at}"),
                SecondFactorState::Unverified => "session has not completed TOTP verification".to_string(),
            },
        });
    }

    let verdict = if !allowed {
        let mut reason = format!(
            "requires {}",
            requirement
                .predicates()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or ")
        );
        if second_factor_state.is_some_and(|s| !s.is_verified()) {
            reason.push_str("; second-factor verification also missing");
        }
        Err(AuthzError::Forbidden { reason })
    } else {
        match second_factor_state {
            None | Some(SecondFactorState::Verified { .. }) => Ok(()),
            Some(SecondFactorState::Unverified) => Err(AuthzError::SecondFactorRequired),
            Some(SecondFactorState::Expired { .. }) => Err(AuthzError::SecondFactorExpired),
        }
    };

    Evaluation {
        checks,
        second_factor: second_factor_state,
        verdict,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record scoping
// ─────────────────────────────────────────────────────────────────────────────

/// A record that can report which principals own it.
pub trait OwnedRecord {
    fn is_owned_by(&self, principal: PrincipalId) -> bool;
}

/// Which records of a kind a caller may see in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "owner", rename_all = "snake_case")]
pub enum RecordScope {
    All,
    OwnedBy(PrincipalId),
    Nothing,
}

impl RecordScope {
    pub fn for_principal(principal: Option<&Principal>, resource: ResourceKind) -> Self {
        let Some(principal) = principal else {
            return RecordScope::Nothing;
        };
        if superuser_override(principal) {
            return RecordScope::All;
        }

        match resource {
            ResourceKind::Observatory | ResourceKind::Astronomer => RecordScope::All,
            ResourceKind::Researcher => RecordScope::OwnedBy(principal.id),
            ResourceKind::Observation => match principal.role {
                Some(Role::Astronomer | Role::Researcher) => RecordScope::OwnedBy(principal.id),
                _ => RecordScope::Nothing,
            },
            ResourceKind::SpaceObject => match principal.role {
                Some(Role::Astronomer) => RecordScope::OwnedBy(principal.id),
                _ => RecordScope::Nothing,
            },
        }
    }

    pub fn admits<R: OwnedRecord + ?Sized>(&self, record: &R) -> bool {
        match self {
            RecordScope::All => true,
            RecordScope::OwnedBy(owner) => record.is_owned_by(*owner),
            RecordScope::Nothing => false,
        }
    }

    pub fn filter<R, I>(&self, records: I) -> Vec<R>
    where
        R: OwnedRecord,
        I: IntoIterator<Item = R>,
    {
        records.into_iter().filter(|r| self.admits(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{ActionRequirements, Action, grants};

    fn t() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn researcher() -> Principal {
        Principal::new(PrincipalId::new(), "rhea").with_role(Role::Researcher)
    }

    fn unverified() -> SecondFactorState {
        SecondFactorState::Unverified
    }

    #[test]
    fn superuser_short_circuits_without_consulting_second_factor() {
        let p = Principal::new(PrincipalId::new(), "root").superuser();
        let req = ActionRequirement::role(Role::Admin).with_second_factor();
        let eval = evaluate(&p, &req, &ResourceContext::none(), || panic!("must not be consulted"));
        assert!(eval.verdict.is_ok());
        assert_eq!(eval.second_factor, None);
    }

    #[test]
    fn grant_is_independent_of_role() {
        let p = researcher().with_grant(grants::MANAGE_OBSERVATIONS);
        let req = ActionRequirements::standard();
        let req = req.get(ResourceKind::Observation, Action::Create).unwrap();
        assert!(evaluate(&p, req, &ResourceContext::none(), unverified).verdict.is_ok());
        assert!(matches!(
            evaluate(&researcher(), req, &ResourceContext::none(), unverified).verdict,
            Err(AuthzError::Forbidden { .. })
        ));
    }

    #[test]
    fn first_passing_predicate_stops_the_scan() {
        let p = Principal::new(PrincipalId::new(), "ash").with_role(Role::Astronomer);
        let req = ActionRequirement::any_of([
            Predicate::Grant(grants::MANAGE_OBSERVATIONS),
            Predicate::Role(Role::Astronomer),
        ]);
        let eval = evaluate(&p, &req, &ResourceContext::none(), unverified);
        assert!(eval.verdict.is_ok());
        assert_eq!(eval.checks.len(), 1);
        assert_eq!(eval.checks[0].predicate, "role 'astronomer'");
    }

    #[test]
    fn ownership_requires_matching_owner() {
        let owner = researcher();
        let other = researcher();
        let ctx = ResourceContext::owned_by(owner.id);
        let req = ActionRequirement::owner();

        assert!(evaluate(&owner, &req, &ctx, unverified).verdict.is_ok());
        let denied = evaluate(&other, &req, &ctx, unverified);
        assert!(matches!(denied.verdict, Err(AuthzError::Forbidden { .. })));
        assert_eq!(denied.checks[0].detail, "record is owned by another principal");

        let no_ctx = evaluate(&owner, &req, &ResourceContext::none(), unverified);
        assert!(no_ctx.verdict.is_err());
    }

    #[test]
    fn second_factor_is_an_and_gate() {
        let p = researcher();
        let req = ActionRequirement::authenticated().with_second_factor();
        let ctx = ResourceContext::none();

        assert_eq!(evaluate(&p, &req, &ctx, unverified).verdict, Err(AuthzError::SecondFactorRequired));
        assert_eq!(
            evaluate(&p, &req, &ctx, || SecondFactorState::Expired { expired_at: t() }).verdict,
            Err(AuthzError::SecondFactorExpired)
        );
        assert_eq!(
            evaluate(&p, &req, &ctx, || SecondFactorState::Verified { expires_at: t() }).verdict,
            Ok(())
        );
    }

    #[test]
    fn verified_second_factor_does_not_grant_missing_role() {
        let p = researcher();
        let req = ActionRequirement::role(Role::Admin).with_second_factor();
        let eval = evaluate(&p, &req, &ResourceContext::none(), || SecondFactorState::Verified {
            expires_at: t(),
        });
        assert_eq!(
            eval.verdict,
            Err(AuthzError::Forbidden {
                reason: "requires role 'admin'".to_string()
            })
        );
    }

    #[test]
    fn composite_reason_lists_every_missing_piece() {
        let p = researcher();
        let req = ActionRequirement::role(Role::Admin).with_second_factor();
        let eval = evaluate(&p, &req, &ResourceContext::none(), unverified);
        let Err(AuthzError::Forbidden { reason }) = eval.verdict else {
            panic!("expected forbidden");
        };
        assert_eq!(reason, "requires role 'admin'; second-factor verification also missing");
    }

    struct Obs {
        astronomer: PrincipalId,
        researcher: PrincipalId,
    }

    impl OwnedRecord for Obs {
        fn is_owned_by(&self, principal: PrincipalId) -> bool {
            self.astronomer == principal || self.researcher == principal
        }
    }

    #[test]
    fn astronomers_only_see_their_own_observations() {
        let a = Principal::new(PrincipalId::new(), "a").with_role(Role::Astronomer);
        let b = Principal::new(PrincipalId::new(), "b").with_role(Role::Astronomer);
        let r = researcher();

        let records = vec![
            Obs { astronomer: a.id, researcher: r.id },
            Obs { astronomer: b.id, researcher: r.id },
            Obs { astronomer: b.id, researcher: PrincipalId::new() },
        ];

        let scope_a = RecordScope::for_principal(Some(&a), ResourceKind::Observation);
        assert_eq!(scope_a, RecordScope::OwnedBy(a.id));
        let seen = scope_a.filter(records.iter().collect::<Vec<_>>());
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|o| o.astronomer == a.id));

        let scope_r = RecordScope::for_principal(Some(&r), ResourceKind::Observation);
        assert_eq!(scope_r.filter(records.iter().collect::<Vec<_>>()).len(), 2);
    }

    impl OwnedRecord for &Obs {
        fn is_owned_by(&self, principal: PrincipalId) -> bool {
            (**self).is_owned_by(principal)
        }
    }

    #[test]
    fn scope_rules() {
        let admin = Principal::new(PrincipalId::new(), "adm").with_role(Role::Admin);
        let root = Principal::new(PrincipalId::new(), "root").superuser();

        assert_eq!(RecordScope::for_principal(None, ResourceKind::Observatory), RecordScope::Nothing);
        assert_eq!(RecordScope::for_principal(Some(&root), ResourceKind::SpaceObject), RecordScope::All);
        assert_eq!(RecordScope::for_principal(Some(&admin), ResourceKind::Observation), RecordScope::Nothing);
        assert_eq!(RecordScope::for_principal(Some(&admin), ResourceKind::Observatory), RecordScope::All);
        assert_eq!(
            RecordScope::for_principal(Some(&admin), ResourceKind::Researcher),
            RecordScope::OwnedBy(admin.id)
        );
        assert_eq!(
            RecordScope::for_principal(Some(&researcher()), ResourceKind::SpaceObject),
            RecordScope::Nothing
        );
    }
}
