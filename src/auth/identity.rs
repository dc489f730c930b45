//! Authenticated identity: who the caller is and what they may do.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Coarse-grained permission tier.
///
/// There is no implicit hierarchy: `Admin` does not satisfy a `Manager` gate
/// unless the gate lists both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
        }
    }

    /// Scopes granted to a freshly registered account with this role.
    pub fn default_scopes(&self) -> BTreeSet<String> {
        let scopes: &[&str] = match self {
            Role::Admin => &[
                "users:read",
                "users:write",
                "users:delete",
                "items:read",
                "items:write",
            ],
            Role::Manager => &["users:read", "items:read", "items:write"],
            Role::User => &["items:read"],
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            _ => Err(ValidationError::InvalidFormat("role".to_string())),
        }
    }
}

/// Immutable identity produced at authentication time and embedded in tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
    pub scopes: BTreeSet<String>,
}

impl Identity {
    pub fn new<I, S>(subject: impl Into<String>, role: Role, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            role,
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), "\"manager\"");
    }

    #[test]
    fn test_default_scopes() {
        assert_eq!(Role::User.default_scopes().len(), 1);
        assert!(Role::Admin.default_scopes().contains("users:delete"));
        assert!(!Role::Manager.default_scopes().contains("users:delete"));
    }

    #[test]
    fn test_identity_scopes_deduplicate() {
        let identity = Identity::new("bob", Role::User, ["items:read", "items:read"]);
        assert_eq!(identity.scopes.len(), 1);
        assert!(identity.has_scope("items:read"));
        assert!(!identity.has_scope("items:write"));
    }
}
