use core::str::FromStr;

use serde::{Deserialize, Serialize};

use astrocat_core::{DomainError, DomainResult};

/// Role classification of a principal.
///
/// Resolved once when the principal is loaded from the directory; a principal
/// carries at most one role at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Researcher,
    Astronomer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Researcher, Role::Astronomer, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Researcher => "researcher",
            Role::Astronomer => "astronomer",
            Role::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::unknown("role", s))
    }
}
