//! Authorization Checker
//!
//! Requirements are built (and their scope strings validated) once, when a
//! protected operation is registered. Checking one against an identity is a
//! pure boolean decision; turning `false` into a denial response is the
//! caller's job.

use std::collections::BTreeSet;

use crate::auth::identity::{Identity, Role};
use crate::error::RequirementError;
use crate::validators::is_valid_scope;

/// Role gate. There is no implied hierarchy between roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    Exact(Role),
    AnyOf(BTreeSet<Role>),
}

impl RoleRequirement {
    pub fn any_of<I>(roles: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = Role>,
    {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        if roles.is_empty() {
            return Err(RequirementError::NoRoles);
        }
        Ok(RoleRequirement::AnyOf(roles))
    }

    pub fn is_satisfied_by(&self, identity: &Identity) -> bool {
        match self {
            RoleRequirement::Exact(role) => identity.role == *role,
            RoleRequirement::AnyOf(roles) => roles.contains(&identity.role),
        }
    }
}

/// A single scope the identity must hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRequirement(String);

impl ScopeRequirement {
    pub fn new(scope: impl Into<String>) -> Result<Self, RequirementError> {
        let scope = scope.into();
        if scope.is_empty() {
            return Err(RequirementError::EmptyScope);
        }
        is_valid_scope(&scope).map_err(|_| RequirementError::InvalidScope(scope.clone()))?;
        Ok(Self(scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_satisfied_by(&self, identity: &Identity) -> bool {
        identity.has_scope(&self.0)
    }
}

/// What a protected operation demands of its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Role(RoleRequirement),
    Scope(ScopeRequirement),
    /// Every inner requirement must hold
    All(Vec<Requirement>),
}

impl Requirement {
    pub fn role(role: Role) -> Self {
        Requirement::Role(RoleRequirement::Exact(role))
    }

    pub fn any_role<I>(roles: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = Role>,
    {
        RoleRequirement::any_of(roles).map(Requirement::Role)
    }

    pub fn scope(scope: impl Into<String>) -> Result<Self, RequirementError> {
        ScopeRequirement::new(scope).map(Requirement::Scope)
    }

    /// A role gate plus a set of scopes, all of which must hold
    pub fn role_with_scopes<I, S>(role: RoleRequirement, scopes: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = vec![Requirement::Role(role)];
        for scope in scopes {
            parts.push(Requirement::scope(scope)?);
        }
        Ok(Requirement::All(parts))
    }

    pub fn and(self, other: Requirement) -> Self {
        match self {
            Requirement::All(mut parts) => {
                parts.push(other);
                Requirement::All(parts)
            }
            single => Requirement::All(vec![single, other]),
        }
    }

    pub fn is_satisfied_by(&self, identity: &Identity) -> bool {
        match self {
            Requirement::Role(role) => role.is_satisfied_by(identity),
            Requirement::Scope(scope) => scope.is_satisfied_by(identity),
            Requirement::All(parts) => parts.iter().all(|part| part.is_satisfied_by(identity)),
        }
    }
}

/// Admins only
pub fn require_admin() -> Requirement {
    Requirement::role(Role::Admin)
}

/// Managers and admins
pub fn require_manager() -> Requirement {
    Requirement::Role(RoleRequirement::AnyOf(BTreeSet::from([Role::Admin, Role::Manager])))
}

/// Any authenticated role
pub fn require_user() -> Requirement {
    Requirement::Role(RoleRequirement::AnyOf(Role::ALL.into_iter().collect()))
}

/// Decide whether `identity` may perform an operation guarded by `required`.
pub fn authorize(identity: &Identity, required: &Requirement) -> bool {
    let allowed = required.is_satisfied_by(identity);
    if !allowed {
        tracing::debug!(
            subject = %identity.subject,
            role = %identity.role,
            requirement = ?required,
            "Authorization denied"
        );
    }
    allowed
}
