//! Authentication service
//!
//! Wires the issuer, validator, refresh coordinator and revocation registry
//! together behind the five calls a transport layer makes: `login`,
//! `refresh`, `logout`, `validate` and `authorize`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::authorize::{authorize, Requirement};
use crate::auth::codec::TokenCodec;
use crate::auth::credentials::{CredentialStore, InMemoryCredentialStore};
use crate::auth::identity::Identity;
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::password::PasswordHasher;
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::revocation::{
    spawn_revocation_janitor, InMemoryRevocationStore, RevocationRegistry, RevocationStore,
};
use crate::auth::secret::{SecretProvider, SigningSecret, StaticSecretProvider};
use crate::auth::validator::AccessValidator;
use crate::clock::{Clock, SystemClock};
use crate::configuration::Settings;
use crate::error::{AuthError, ConfigError, ErrorContext};

pub struct AuthService {
    issuer: Arc<TokenIssuer>,
    validator: AccessValidator,
    coordinator: RefreshCoordinator,
    registry: Arc<RevocationRegistry>,
    credentials: Arc<dyn CredentialStore>,
    purge_interval: std::time::Duration,
}

/// Builder for [`AuthService`]. Anything not supplied falls back to the
/// system clock, the configured secret and in-memory stores.
pub struct AuthServiceBuilder {
    settings: Settings,
    clock: Option<Arc<dyn Clock>>,
    secrets: Option<Arc<dyn SecretProvider>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    revocation_store: Option<Arc<dyn RevocationStore>>,
}

impl AuthServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.revocation_store = Some(store);
        self
    }

    /// # Errors
    /// `ConfigError` if the settings fail validation
    pub fn build(self) -> Result<AuthService, ConfigError> {
        let settings = self.settings;
        settings.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let secrets = self.secrets.unwrap_or_else(|| {
            Arc::new(StaticSecretProvider::new(SigningSecret::new(
                settings.auth.signing_secret.as_bytes(),
            )))
        });
        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(InMemoryCredentialStore::new(PasswordHasher::new(
                settings.credentials.bcrypt_cost,
            )))
        });
        let revocation_store = self
            .revocation_store
            .unwrap_or_else(|| Arc::new(InMemoryRevocationStore::new()));

        let codec = TokenCodec::new(settings.auth.issuer.as_str());
        let issuer = Arc::new(TokenIssuer::new(
            codec.clone(),
            secrets.clone(),
            clock.clone(),
            settings.auth.access_token_ttl(),
            settings.auth.refresh_token_ttl(),
        ));
        let registry = Arc::new(RevocationRegistry::new(
            revocation_store,
            clock.clone(),
            settings.revocation.store_ttl_floor(),
            settings.revocation.store_timeout(),
        ));
        let validator = AccessValidator::new(codec.clone(), secrets.clone(), clock.clone());
        let coordinator =
            RefreshCoordinator::new(codec, secrets, clock, issuer.clone(), registry.clone())
                .with_credentials(credentials.clone());

        tracing::info!(
            issuer = %settings.auth.issuer,
            access_ttl_secs = settings.auth.access_token_ttl_secs,
            refresh_ttl_secs = settings.auth.refresh_token_ttl_secs,
            "Authentication service ready"
        );

        Ok(AuthService {
            issuer,
            validator,
            coordinator,
            registry,
            credentials,
            purge_interval: settings.revocation.purge_interval(),
        })
    }
}

impl AuthService {
    pub fn builder(settings: Settings) -> AuthServiceBuilder {
        AuthServiceBuilder {
            settings,
            clock: None,
            secrets: None,
            credentials: None,
            revocation_store: None,
        }
    }

    /// Authenticate with username and password
    ///
    /// Unknown users, wrong passwords and disabled accounts all produce the
    /// same `Unauthenticated`.
    ///
    /// # Errors
    /// - `Unauthenticated` if the credentials don't resolve to an identity
    /// - `Infrastructure` if the credential store fails
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let context = ErrorContext::new("user_login").with_subject(username);

        let identity = match self.credentials.verify(username, password).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::info!(
                    request_id = %context.request_id,
                    subject = %username,
                    "Login rejected"
                );
                return Err(AuthError::Unauthenticated);
            }
            Err(e) => {
                let err = AuthError::from(e);
                context.log_error(&err);
                return Err(err);
            }
        };

        let pair = self.issuer.issue(&identity)?;
        tracing::info!(
            request_id = %context.request_id,
            subject = %identity.subject,
            role = %identity.role,
            "User logged in successfully"
        );
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. See [`RefreshCoordinator::refresh`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.coordinator.refresh(refresh_token).await
    }

    /// Revoke a refresh token. Never fails.
    pub async fn logout(&self, refresh_token: &str) {
        self.coordinator.logout(refresh_token).await
    }

    /// Validate an access token. See [`AccessValidator::validate`].
    pub fn validate(&self, access_token: &str) -> Result<Identity, AuthError> {
        self.validator.validate(access_token)
    }

    pub fn authorize(&self, identity: &Identity, required: &Requirement) -> bool {
        authorize(identity, required)
    }

    /// Validate, then authorize. A valid token whose identity doesn't meet
    /// `required` yields `Ok(false)`.
    pub fn validate_and_authorize(
        &self,
        access_token: &str,
        required: &Requirement,
    ) -> Result<bool, AuthError> {
        let identity = self.validate(access_token)?;
        Ok(authorize(&identity, required))
    }

    pub fn registry(&self) -> &Arc<RevocationRegistry> {
        &self.registry
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Start the background purge of expired revocation entries.
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        spawn_revocation_janitor(self.registry.clone(), self.purge_interval)
    }
}
