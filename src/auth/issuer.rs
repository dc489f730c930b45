//! Token Issuer
//!
//! Mints an access/refresh pair for an authenticated identity. Issuing has no
//! side effects: a fresh pair needs no revocation bookkeeping until it is
//! rotated or logged out.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{TokenClaims, TokenKind};
use crate::auth::codec::{EncodedToken, TokenCodec};
use crate::auth::identity::Identity;
use crate::auth::secret::SecretProvider;
use crate::clock::Clock;
use crate::error::AuthError;

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Access and refresh token minted together for one identity
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: EncodedToken,
    pub refresh_token: EncodedToken,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Mints token pairs with independently configured lifetimes
pub struct TokenIssuer {
    codec: TokenCodec,
    secrets: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        codec: TokenCodec,
        secrets: Arc<dyn SecretProvider>,
        clock: Arc<dyn Clock>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        debug_assert!(access_ttl < refresh_ttl, "access lifetime must be shorter");
        Self {
            codec,
            secrets,
            clock,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a new access/refresh pair
    ///
    /// Both tokens share `issued_at` and subject but carry distinct,
    /// randomly generated token ids.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if signing fails or a lifetime overflows
    pub fn issue(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        // Truncate so the signed timestamps survive the millisecond wire format
        let issued_at = self.clock.now().trunc_subsecs(3);
        let access_claims = self.claims_for(identity, TokenKind::Access, issued_at)?;
        let refresh_claims = self.claims_for(identity, TokenKind::Refresh, issued_at)?;

        let secret = self.secrets.signing_secret();
        let access_token = self.codec.encode(&access_claims, &secret)?;
        let refresh_token = self.codec.encode(&refresh_claims, &secret)?;

        tracing::debug!(
            subject = %identity.subject,
            access_token_id = %access_claims.token_id,
            refresh_token_id = %refresh_claims.token_id,
            "Issued token pair"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: self.access_ttl.num_seconds(),
            access_expires_at: access_claims.expires_at,
            refresh_expires_at: refresh_claims.expires_at,
        })
    }

    fn claims_for(
        &self,
        identity: &Identity,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
    ) -> Result<TokenClaims, AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = issued_at.checked_add_signed(ttl).ok_or_else(|| {
            AuthError::Internal(format!("{} token lifetime overflows the calendar", kind))
        })?;
        Ok(TokenClaims {
            subject: identity.subject.clone(),
            token_id: Uuid::new_v4().to_string(),
            kind,
            role: identity.role,
            scopes: identity.scopes.clone(),
            issued_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Role;
    use crate::auth::secret::{SigningSecret, StaticSecretProvider};
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn secret() -> SigningSecret {
        SigningSecret::new("test-secret-key-at-least-32-characters-long")
    }

    fn issuer_at(start: DateTime<Utc>) -> TokenIssuer {
        TokenIssuer::new(
            TokenCodec::new("test"),
            Arc::new(StaticSecretProvider::new(secret())),
            Arc::new(ManualClock::new(start)),
            Duration::minutes(15),
            Duration::days(7),
        )
    }

    fn decode(token: &EncodedToken) -> TokenClaims {
        TokenCodec::new("test").decode(token.as_str(), &secret()).unwrap()
    }

    #[test]
    fn test_issue_pair() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_500).unwrap();
        let identity = Identity::new("alice", Role::Admin, ["items:read"]);
        let pair = issuer_at(now).issue(&identity).expect("Failed to issue pair");

        let access = decode(&pair.access_token);
        let refresh = decode(&pair.refresh_token);

        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(access.subject, "alice");
        assert_eq!(refresh.subject, "alice");
        assert_eq!(access.issued_at, now);
        assert_eq!(refresh.issued_at, now);
        assert_eq!(access.expires_at, now + Duration::minutes(15));
        assert_eq!(refresh.expires_at, now + Duration::days(7));
        assert_ne!(access.token_id, refresh.token_id);
        assert_eq!(access.identity(), identity);
    }

    #[test]
    fn test_pair_metadata() {
        let now = Utc::now();
        let pair = issuer_at(now)
            .issue(&Identity::new("bob", Role::User, ["items:read"]))
            .unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
        assert!(pair.access_expires_at < pair.refresh_expires_at);
    }

    #[test]
    fn test_overflowing_lifetime_is_an_error() {
        let issuer = TokenIssuer::new(
            TokenCodec::new("test"),
            Arc::new(StaticSecretProvider::new(secret())),
            Arc::new(ManualClock::new(Utc::now())),
            Duration::minutes(15),
            Duration::MAX,
        );
        let result = issuer.issue(&Identity::new("bob", Role::User, ["items:read"]));
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[test]
    fn test_token_ids_never_repeat() {
        let issuer = issuer_at(Utc::now());
        let identity = Identity::new("bob", Role::User, ["items:read"]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let pair = issuer.issue(&identity).unwrap();
            assert!(seen.insert(decode(&pair.access_token).token_id));
            assert!(seen.insert(decode(&pair.refresh_token).token_id));
        }
    }
}
