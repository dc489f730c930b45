//! Access Validator
//!
//! Turns an access token into the identity it carries.
//!
//! Access tokens are deliberately *not* checked against the revocation
//! registry. Doing so would put a store lookup on every protected request and
//! undo the point of short-lived stateless access tokens. A leaked access
//! token therefore stays usable until its own `expires_at`; that window is
//! bounded only by the access lifetime. Logging out revokes the refresh token,
//! not outstanding access tokens.

use std::sync::Arc;

use crate::auth::claims::TokenKind;
use crate::auth::codec::TokenCodec;
use crate::auth::identity::Identity;
use crate::auth::secret::SecretProvider;
use crate::clock::Clock;
use crate::error::AuthError;

pub struct AccessValidator {
    codec: TokenCodec,
    secrets: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
}

impl AccessValidator {
    pub fn new(codec: TokenCodec, secrets: Arc<dyn SecretProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec,
            secrets,
            clock,
        }
    }

    /// Validate an access token and return the embedded identity
    ///
    /// Checks, in order: signature and structure, token kind, expiry.
    ///
    /// # Errors
    /// - `Unauthenticated` if the token is malformed or not signed by us
    /// - `WrongTokenKind` if a refresh token is presented
    /// - `Expired` if `expires_at <= now`
    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self
            .codec
            .decode(token, &self.secrets.signing_secret())
            .map_err(|e| {
                tracing::warn!(error = %e, "Access token rejected by codec");
                AuthError::Unauthenticated
            })?;

        if claims.kind != TokenKind::Access {
            tracing::warn!(
                subject = %claims.subject,
                token_id = %claims.token_id,
                kind = %claims.kind,
                "Non-access token presented for access"
            );
            return Err(AuthError::WrongTokenKind);
        }

        if claims.is_expired_at(self.clock.now()) {
            tracing::debug!(subject = %claims.subject, "Access token expired");
            return Err(AuthError::Expired);
        }

        Ok(claims.identity())
    }
}
