//! Token Claims
//!
//! The payload carried inside every signed token. Timestamps are kept at
//! millisecond precision so that an encoded token decodes back to exactly the
//! claims that were signed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::identity::{Identity, Role};

/// Which half of a token pair a token is. Fixed at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims for access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username)
    #[serde(rename = "sub")]
    pub subject: String,
    /// Unique per issuance, generated by the issuer
    #[serde(rename = "jti")]
    pub token_id: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub role: Role,
    pub scopes: BTreeSet<String>,
    #[serde(rename = "iat_ms", with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "exp_ms", with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Expiry is exclusive: a token whose `expires_at` equals `now` is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn identity(&self) -> Identity {
        Identity {
            subject: self.subject.clone(),
            role: self.role,
            scopes: self.scopes.clone(),
        }
    }
}
