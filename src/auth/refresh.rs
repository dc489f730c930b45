//! Refresh Coordinator
//!
//! Refresh tokens are single-use. Per token id the lifecycle is:
//!
//! ```text
//! ISSUED ──refresh──▶ ROTATED   (terminal, recorded in the registry)
//!    │
//!    ├────logout────▶ REVOKED   (terminal, recorded in the registry)
//!    │
//!    └─────time─────▶ EXPIRED   (implicit, no registry entry needed)
//! ```
//!
//! Rotation marks the presented id revoked with one atomic check-and-set, so
//! of two concurrent refreshes with the same token exactly one wins. The loser
//! sees `TokenReuseDetected`.
//!
//! The subject is re-resolved *before* the id is revoked, so a credential
//! store outage leaves the token usable and the retry can succeed. A subject
//! that no longer resolves still has its token revoked, and a replayed token
//! is reported as reuse whatever the account state.
//!
//! The old id is revoked *before* the new pair is built. If the caller drops
//! the future after that point, or the pair never reaches the client, the old
//! token is still dead and the client has to log in again. Rotation is
//! at-most-once on the old token, not exactly-once end to end.

use std::sync::Arc;

use crate::auth::claims::{TokenClaims, TokenKind};
use crate::auth::codec::TokenCodec;
use crate::auth::credentials::CredentialStore;
use crate::auth::identity::Identity;
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::revocation::RevocationRegistry;
use crate::auth::secret::SecretProvider;
use crate::clock::Clock;
use crate::error::{AuthError, ErrorContext};

pub struct RefreshCoordinator {
    codec: TokenCodec,
    secrets: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
    issuer: Arc<TokenIssuer>,
    registry: Arc<RevocationRegistry>,
    credentials: Option<Arc<dyn CredentialStore>>,
}

impl RefreshCoordinator {
    pub fn new(
        codec: TokenCodec,
        secrets: Arc<dyn SecretProvider>,
        clock: Arc<dyn Clock>,
        issuer: Arc<TokenIssuer>,
        registry: Arc<RevocationRegistry>,
    ) -> Self {
        Self {
            codec,
            secrets,
            clock,
            issuer,
            registry,
            credentials: None,
        }
    }

    /// Re-resolve the subject through `credentials` on every rotation, so role
    /// changes and disabled accounts take effect at the next refresh.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Exchange a refresh token for a new pair, revoking the presented one
    ///
    /// # Errors
    /// - `Unauthenticated` if the token is malformed or foreign, or its subject
    ///   no longer resolves
    /// - `WrongTokenKind` if an access token is presented
    /// - `Expired` if `expires_at <= now`
    /// - `TokenReuseDetected` if the token was already rotated or logged out
    /// - `Infrastructure` if the revocation or credential store fails or times
    ///   out; the presented token is not consumed by a credential store failure
    pub async fn refresh(&self, token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .codec
            .decode(token, &self.secrets.signing_secret())
            .map_err(|e| {
                tracing::warn!(error = %e, "Refresh token rejected by codec");
                AuthError::Unauthenticated
            })?;

        if claims.kind != TokenKind::Refresh {
            tracing::warn!(
                subject = %claims.subject,
                token_id = %claims.token_id,
                kind = %claims.kind,
                "Non-refresh token presented for refresh"
            );
            return Err(AuthError::WrongTokenKind);
        }

        if claims.is_expired_at(self.clock.now()) {
            tracing::info!(subject = %claims.subject, "Refresh token expired");
            return Err(AuthError::Expired);
        }

        let resolved = match &self.credentials {
            Some(credentials) => self.resolve_subject(credentials.as_ref(), &claims).await?,
            None => Some(claims.identity()),
        };

        let revoked_now = self
            .registry
            .revoke_if_absent(&claims.token_id, claims.expires_at)
            .await?;
        if !revoked_now {
            tracing::error!(
                subject = %claims.subject,
                token_id = %claims.token_id,
                code = AuthError::TokenReuseDetected.code(),
                security_event = true,
                "Rotated or logged-out refresh token presented again"
            );
            return Err(AuthError::TokenReuseDetected);
        }

        // The old id is revoked from here on, whatever happens next
        let identity = match resolved {
            Some(identity) => identity,
            None => {
                tracing::warn!(
                    subject = %claims.subject,
                    "Refresh for an account that is disabled or gone"
                );
                return Err(AuthError::Unauthenticated);
            }
        };

        let pair = self.issuer.issue(&identity)?;
        tracing::info!(
            subject = %identity.subject,
            rotated_token_id = %claims.token_id,
            "Refresh token rotated"
        );
        Ok(pair)
    }

    /// Revoke a refresh token. Never fails and never reveals whether the
    /// token was valid; already-expired tokens are accepted.
    pub async fn logout(&self, token: &str) {
        let claims = match self.codec.decode(token, &self.secrets.signing_secret()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Logout with undecodable token ignored");
                return;
            }
        };

        if claims.kind != TokenKind::Refresh {
            tracing::debug!(
                subject = %claims.subject,
                "Logout presented an access token; revoking its id anyway"
            );
        }

        match self.registry.revoke(&claims.token_id, claims.expires_at).await {
            Ok(()) => {
                tracing::info!(
                    subject = %claims.subject,
                    token_id = %claims.token_id,
                    "Refresh token revoked by logout"
                );
            }
            Err(e) => {
                ErrorContext::new("logout")
                    .with_subject(claims.subject.as_str())
                    .log_error(&e);
            }
        }
    }

    async fn resolve_subject(
        &self,
        credentials: &dyn CredentialStore,
        claims: &TokenClaims,
    ) -> Result<Option<Identity>, AuthError> {
        match credentials.lookup(&claims.subject).await {
            Ok(identity) => Ok(identity),
            Err(e) => {
                tracing::error!(subject = %claims.subject, error = %e, "Credential lookup failed");
                Err(e.into())
            }
        }
    }
}
