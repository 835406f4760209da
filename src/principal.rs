//! The acting user, as seen by role conditions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Anything that can answer "is this principal in role X".
///
/// Role names are compared exactly (case-sensitive).
pub trait Principal: Send + Sync {
    /// Returns true if the principal holds `role`.
    fn is_in_role(&self, role: &str) -> bool;
}

/// A fixed set of role names.
///
/// # Examples
///
/// ```
/// use ticket_rules::{Principal, RoleSet};
///
/// let admin = RoleSet::new(["Admin", "Agent"]);
/// assert!(admin.is_in_role("Admin"));
/// assert!(!admin.is_in_role("admin"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: HashSet<String>,
}

impl RoleSet {
    /// Creates a role set from role names.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// A principal with no roles.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Number of roles held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// True when no roles are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl Principal for RoleSet {
    fn is_in_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

impl<P: Principal + ?Sized> Principal for &P {
    fn is_in_role(&self, role: &str) -> bool {
        (**self).is_in_role(role)
    }
}
