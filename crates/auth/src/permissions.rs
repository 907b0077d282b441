use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Named capability grant.
///
/// Grants are opaque strings compared by exact match: no wildcards and no
/// hierarchy (`"manage-astronomers"` does not imply anything else).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grants referenced by the standard action requirements.
pub mod grants {
    use super::Permission;

    pub const SEE_STATISTICS: Permission = Permission::from_static("see-statistics");
    pub const MANAGE_ASTRONOMERS: Permission = Permission::from_static("manage-astronomers");
    pub const MANAGE_RESEARCHERS: Permission = Permission::from_static("manage-researchers");
    pub const MANAGE_OBSERVATIONS: Permission = Permission::from_static("manage-observations");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_compare_by_exact_string() {
        assert_eq!(Permission::new("see-statistics".to_string()), grants::SEE_STATISTICS);
        assert_ne!(Permission::new("see-statistics "), grants::SEE_STATISTICS);
        assert_ne!(Permission::new("manage-*"), grants::MANAGE_ASTRONOMERS);
    }
}
