//! Credential Store
//!
//! The core only needs two questions answered: "do these credentials belong to
//! someone?" and "who is this subject now?". `InMemoryCredentialStore` answers
//! them for single-process deployments and tests, and carries the account
//! administration operations (register, role change, disable, remove).

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::auth::identity::{Identity, Role};
use crate::auth::password::{validate_password_strength, verify_password, PasswordHasher};
use crate::error::{CredentialError, StoreError};
use crate::validators::{is_valid_scope, is_valid_username};

/// Source of user identities.
///
/// Unknown and disabled accounts are indistinguishable to callers: both
/// resolve to `None`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check a username/password pair.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Identity>, StoreError>;

    /// Resolve the current identity of an already-authenticated subject.
    async fn lookup(&self, subject: &str) -> Result<Option<Identity>, StoreError>;
}

/// Stored account
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub scopes: BTreeSet<String>,
    pub disabled: bool,
}

impl UserRecord {
    pub fn identity(&self) -> Identity {
        Identity {
            subject: self.username.clone(),
            role: self.role,
            scopes: self.scopes.clone(),
        }
    }
}

/// Registration request
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    /// Explicit scopes; the role's defaults when `None`
    pub scopes: Option<BTreeSet<String>>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            role,
            scopes: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }
}

const DUMMY_PASSWORD: &str = "Dummy-password-for-timing-1";

#[derive(Debug)]
pub struct InMemoryCredentialStore {
    users: DashMap<String, UserRecord>,
    hasher: PasswordHasher,
    /// Checked against when there is no usable account, so every `verify`
    /// costs one bcrypt comparison
    dummy_hash: OnceCell<String>,
}

impl InMemoryCredentialStore {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            users: DashMap::new(),
            hasher,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Register a new account
    ///
    /// # Errors
    /// - `Validation` for a bad username, weak password or malformed scope
    /// - `DuplicateUser` if the username is taken
    pub async fn register(&self, new_user: NewUser) -> Result<Identity, CredentialError> {
        let username = is_valid_username(&new_user.username)?;
        validate_password_strength(&new_user.password)?;
        let scopes = match new_user.scopes {
            Some(scopes) => {
                for scope in &scopes {
                    is_valid_scope(scope)?;
                }
                scopes
            }
            None => new_user.role.default_scopes(),
        };

        if self.users.contains_key(&username) {
            return Err(CredentialError::DuplicateUser);
        }

        let hasher = self.hasher;
        let password = new_user.password;
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| StoreError::Backend(format!("hashing task failed: {}", e)))??;

        let record = UserRecord {
            username: username.clone(),
            password_hash,
            role: new_user.role,
            scopes,
            disabled: false,
        };
        let identity = record.identity();

        // Re-check under the shard lock; another registration may have won while hashing
        match self.users.entry(username) {
            Entry::Occupied(_) => Err(CredentialError::DuplicateUser),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                tracing::info!(subject = %identity.subject, role = %identity.role, "User registered");
                Ok(identity)
            }
        }
    }

    /// Insert a record with a precomputed hash (seeding, migrations)
    pub fn insert_record(&self, record: UserRecord) {
        self.users.insert(record.username.clone(), record);
    }

    /// Change a user's role; scopes reset to the new role's defaults
    pub fn set_role(&self, username: &str, role: Role) -> Result<Identity, CredentialError> {
        let mut record = self
            .users
            .get_mut(username)
            .ok_or(CredentialError::UnknownUser)?;
        record.role = role;
        record.scopes = role.default_scopes();
        tracing::info!(subject = %username, role = %role, "User role changed");
        Ok(record.identity())
    }

    pub fn set_disabled(&self, username: &str, disabled: bool) -> Result<(), CredentialError> {
        let mut record = self
            .users
            .get_mut(username)
            .ok_or(CredentialError::UnknownUser)?;
        record.disabled = disabled;
        tracing::info!(subject = %username, disabled, "User disabled flag changed");
        Ok(())
    }

    pub fn remove(&self, username: &str) -> Result<(), CredentialError> {
        self.users
            .remove(username)
            .map(|_| tracing::info!(subject = %username, "User removed"))
            .ok_or(CredentialError::UnknownUser)
    }

    pub fn get(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).map(|record| record.clone())
    }

    /// All identities, ordered by subject
    pub fn list(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> =
            self.users.iter().map(|entry| entry.value().identity()).collect();
        identities.sort_by(|a, b| a.subject.cmp(&b.subject));
        identities
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    async fn dummy_hash(&self) -> Result<String, StoreError> {
        let hasher = self.hasher;
        let hash = self
            .dummy_hash
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || hasher.hash(DUMMY_PASSWORD))
                    .await
                    .map_err(|e| StoreError::Backend(format!("hashing task failed: {}", e)))?
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .await?;
        Ok(hash.clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Identity>, StoreError> {
        // Clone out so no shard lock is held across the await
        let (hash, identity) = match self.get(username) {
            Some(record) if !record.disabled => (record.password_hash.clone(), Some(record.identity())),
            Some(_) => {
                tracing::info!(subject = %username, "Login attempt for disabled account");
                (self.dummy_hash().await?, None)
            }
            None => (self.dummy_hash().await?, None),
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| StoreError::Backend(format!("verification task failed: {}", e)))?;

        Ok(identity.filter(|_| matches))
    }

    async fn lookup(&self, subject: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .users
            .get(subject)
            .filter(|record| !record.disabled)
            .map(|record| record.identity()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn store() -> InMemoryCredentialStore {
        InMemoryCredentialStore::new(PasswordHasher::new(4))
    }

    #[tokio::test]
    async fn test_register_and_verify() {
        let store = store();
        let identity = store
            .register(NewUser::new("alice", "Secret123", Role::Admin))
            .await
            .expect("Failed to register");

        assert_eq!(identity.subject, "alice");
        assert!(identity.has_scope("users:delete"));

        let verified = store.verify("alice", "Secret123").await.unwrap();
        assert_eq!(verified, Some(identity));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let store = store();
        store
            .register(NewUser::new("alice", "Secret123", Role::Admin))
            .await
            .unwrap();

        assert_eq!(store.verify("alice", "Wrong12345").await.unwrap(), None);
        assert_eq!(store.verify("nobody", "Secret123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_and_disabled_accounts_still_pay_for_bcrypt() {
        let store = store();
        store
            .register(NewUser::new("alice", "Secret123", Role::Admin))
            .await
            .unwrap();

        assert!(store.verify("alice", "Secret123").await.unwrap().is_some());
        assert!(!store.dummy_hash.initialized());

        assert_eq!(store.verify("nobody", "Secret123").await.unwrap(), None);
        assert!(store.dummy_hash.initialized());

        // The dummy password itself opens nothing
        assert_eq!(store.verify("nobody", DUMMY_PASSWORD).await.unwrap(), None);

        store.set_disabled("alice", true).unwrap();
        assert_eq!(store.verify("alice", "Secret123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = store();
        store
            .register(NewUser::new("alice", "Secret123", Role::User))
            .await
            .unwrap();

        let result = store.register(NewUser::new("alice", "Other12345", Role::User)).await;
        assert_eq!(result, Err(CredentialError::DuplicateUser));
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let result = store().register(NewUser::new("alice", "weak", Role::User)).await;
        assert!(matches!(
            result,
            Err(CredentialError::Validation(ValidationError::TooShort(_, _)))
        ));
    }

    #[tokio::test]
    async fn test_explicit_scopes_are_validated() {
        let store = store();
        let identity = store
            .register(NewUser::new("charlie", "Secret123", Role::User).with_scopes(["items:read", "items:write"]))
            .await
            .unwrap();
        assert!(identity.has_scope("items:write"));

        let result = store
            .register(NewUser::new("dave", "Secret123", Role::User).with_scopes(["everything"]))
            .await;
        assert!(matches!(result, Err(CredentialError::Validation(_))));
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_verify_or_lookup() {
        let store = store();
        store
            .register(NewUser::new("bob", "Secret123", Role::User))
            .await
            .unwrap();
        store.set_disabled("bob", true).unwrap();

        assert_eq!(store.verify("bob", "Secret123").await.unwrap(), None);
        assert_eq!(store.lookup("bob").await.unwrap(), None);

        store.set_disabled("bob", false).unwrap();
        assert!(store.lookup("bob").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_role_resets_scopes() {
        let store = store();
        store
            .register(NewUser::new("bob", "Secret123", Role::User))
            .await
            .unwrap();

        let identity = store.set_role("bob", Role::Manager).unwrap();
        assert_eq!(identity.role, Role::Manager);
        assert_eq!(identity.scopes, Role::Manager.default_scopes());
        assert_eq!(store.lookup("bob").await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn test_remove_and_unknown_user() {
        let store = store();
        store
            .register(NewUser::new("bob", "Secret123", Role::User))
            .await
            .unwrap();

        store.remove("bob").unwrap();
        assert!(store.is_empty());
        assert_eq!(store.remove("bob"), Err(CredentialError::UnknownUser));
        assert_eq!(store.set_role("bob", Role::Admin), Err(CredentialError::UnknownUser));
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_fails_closed() {
        let store = store();
        store.insert_record(UserRecord {
            username: "legacy".to_string(),
            password_hash: "md5:deadbeef".to_string(),
            role: Role::User,
            scopes: Role::User.default_scopes(),
            disabled: false,
        });

        assert_eq!(store.verify("legacy", "anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = store();
        for name in ["charlie", "alice", "bob"] {
            store
                .register(NewUser::new(name, "Secret123", Role::User))
                .await
                .unwrap();
        }

        let subjects: Vec<String> = store.list().into_iter().map(|i| i.subject).collect();
        assert_eq!(subjects, ["alice", "bob", "charlie"]);
    }
}
