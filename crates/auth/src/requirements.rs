//! Static mapping from (resource kind, action) to the predicates that guard it.

use std::collections::HashMap;

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use astrocat_core::{DomainError, DomainResult};

use crate::{Permission, Role, grants};

/// Kinds of catalog records guarded by the gate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Observatory,
    Astronomer,
    Researcher,
    Observation,
    SpaceObject,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Observatory,
        ResourceKind::Astronomer,
        ResourceKind::Researcher,
        ResourceKind::Observation,
        ResourceKind::SpaceObject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Observatory => "observatory",
            ResourceKind::Astronomer => "astronomer",
            ResourceKind::Researcher => "researcher",
            ResourceKind::Observation => "observation",
            ResourceKind::SpaceObject => "space-object",
        }
    }
}

/// Operation requested on a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    Read,
    List,
    Update,
    Delete,
    Statistics,
    Export,
    /// Listing of the caller's own records ("my observations").
    ListOwn,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Create,
        Action::Read,
        Action::List,
        Action::Update,
        Action::Delete,
        Action::Statistics,
        Action::Export,
        Action::ListOwn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::List => "list",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Statistics => "statistics",
            Action::Export => "export",
            Action::ListOwn => "list-own",
        }
    }

    /// Read-only actions never require a second factor.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, Action::Create | Action::Update | Action::Delete)
    }
}

macro_rules! impl_kebab_name {
    ($t:ty, $kind:literal) => {
        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> DomainResult<Self> {
                <$t>::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| DomainError::unknown($kind, s))
            }
        }
    };
}

impl_kebab_name!(ResourceKind, "resource kind");
impl_kebab_name!(Action, "action");

/// A single access predicate. Declared predicates of a requirement are OR-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    Role(Role),
    Grant(Permission),
    /// The caller owns the record in the resource context.
    Owner,
    /// Any authenticated caller.
    Authenticated,
}

impl Predicate {
    /// Evaluation priority: role, grant, ownership, then plain authentication.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Predicate::Role(_) => 0,
            Predicate::Grant(_) => 1,
            Predicate::Owner => 2,
            Predicate::Authenticated => 3,
        }
    }
}

impl core::fmt::Display for Predicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Predicate::Role(role) => write!(f, "role '{role}'"),
            Predicate::Grant(permission) => write!(f, "grant '{permission}'"),
            Predicate::Owner => f.write_str("ownership of the record"),
            Predicate::Authenticated => f.write_str("an authenticated principal"),
        }
    }
}

/// What it takes to perform one action on one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequirement {
    any_of: Vec<Predicate>,
    second_factor: bool,
}

impl ActionRequirement {
    pub fn any_of(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut any_of: Vec<Predicate> = predicates.into_iter().collect();
        any_of.sort_by_key(Predicate::priority);
        Self {
            any_of,
            second_factor: false,
        }
    }

    pub fn authenticated() -> Self {
        Self::any_of([Predicate::Authenticated])
    }

    pub fn role(role: Role) -> Self {
        Self::any_of([Predicate::Role(role)])
    }

    pub fn grant(permission: Permission) -> Self {
        Self::any_of([Predicate::Grant(permission)])
    }

    pub fn owner() -> Self {
        Self::any_of([Predicate::Owner])
    }

    /// Layer the second-factor gate on top of the declared predicates.
    pub fn with_second_factor(mut self) -> Self {
        self.second_factor = true;
        self
    }

    /// Declared predicates in evaluation order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.any_of
    }

    pub fn requires_second_factor(&self) -> bool {
        self.second_factor
    }
}

/// Serializable view of one rule (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RuleDefinition {
    pub resource: ResourceKind,
    pub action: Action,
    pub any_of: Vec<Predicate>,
    pub second_factor: bool,
    pub description: String,
}

/// The full (resource kind, action) table. Lookups that miss are denied.
#[derive(Debug, Clone, Default)]
pub struct ActionRequirements {
    rules: HashMap<(ResourceKind, Action), ActionRequirement>,
}

impl ActionRequirements {
    /// A table with no rules: every action is denied.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declare (or replace) the requirement for an action.
    ///
    /// A second-factor gate declared on a read-only action is dropped.
    pub fn require(mut self, resource: ResourceKind, action: Action, mut requirement: ActionRequirement) -> Self {
        if action.is_read_only() && requirement.second_factor {
            tracing::warn!(%resource, %action, "ignoring second-factor gate on read-only action");
            requirement.second_factor = false;
        }
        self.rules.insert((resource, action), requirement);
        self
    }

    pub fn get(&self, resource: ResourceKind, action: Action) -> Option<&ActionRequirement> {
        self.rules.get(&(resource, action))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The catalog's standard policy.
    pub fn standard() -> Self {
        use Action::*;
        use ResourceKind::*;

        let mut table = Self::empty();

        // Shared by every kind.
        for kind in ResourceKind::ALL {
            table = table
                .require(kind, List, ActionRequirement::authenticated())
                .require(kind, Export, ActionRequirement::authenticated())
                .require(kind, Statistics, ActionRequirement::grant(grants::SEE_STATISTICS))
                .require(kind, Update, ActionRequirement::authenticated().with_second_factor())
                .require(kind, Delete, ActionRequirement::authenticated().with_second_factor());
        }

        table
            .require(Observatory, Create, ActionRequirement::role(Role::Admin))
            .require(Observatory, Read, ActionRequirement::authenticated())
            .require(Astronomer, Create, ActionRequirement::grant(grants::MANAGE_ASTRONOMERS))
            .require(Astronomer, Read, ActionRequirement::authenticated())
            .require(Astronomer, ListOwn, ActionRequirement::role(Role::Astronomer))
            .require(Researcher, Create, ActionRequirement::grant(grants::MANAGE_RESEARCHERS))
            .require(Researcher, Read, ActionRequirement::authenticated())
            .require(Researcher, ListOwn, ActionRequirement::role(Role::Researcher))
            .require(
                Observation,
                Create,
                ActionRequirement::any_of([
                    Predicate::Grant(grants::MANAGE_OBSERVATIONS),
                    Predicate::Role(Role::Astronomer),
                ]),
            )
            .require(Observation, Read, ActionRequirement::owner())
            .require(SpaceObject, Create, ActionRequirement::role(Role::Admin))
            .require(SpaceObject, Read, ActionRequirement::owner())
    }

    /// Every rule, sorted by resource then action.
    pub fn rules(&self) -> Vec<RuleDefinition> {
        let mut rules: Vec<RuleDefinition> = self
            .rules
            .iter()
            .map(|(&(resource, action), req)| RuleDefinition {
                resource,
                action,
                any_of: req.any_of.clone(),
                second_factor: req.second_factor,
                description: describe(req),
            })
            .collect();
        rules.sort_by_key(|r| (r.resource, r.action));
        rules
    }
}

fn describe(req: &ActionRequirement) -> String {
    let base = req
        .any_of
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ");

    if req.second_factor {
        format!("requires {base}, plus a verified second factor")
    } else {
        format!("requires {base}")
    }
}
