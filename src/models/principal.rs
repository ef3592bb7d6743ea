use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A user authenticated by the hosting container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The user name, typically an email address.
    pub name: String,
    /// The container roles granted to the user.
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// Creates a new `Principal`.
    pub fn new<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the user belongs to `role`.
    pub fn is_user_in_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
