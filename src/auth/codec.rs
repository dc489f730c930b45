//! Token Codec
//!
//! Signs claims into compact HS256 JWTs and verifies them back. The codec
//! reports only structural and signature failures; it happily decodes an
//! expired token so callers can tell "forged" apart from "old".

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::claims::TokenClaims;
use crate::auth::secret::SigningSecret;
use crate::error::CodecError;

/// Opaque signed token handed to the client.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedToken(String);

impl EncodedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for EncodedToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for EncodedToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl AsRef<str> for EncodedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Tokens are bearer credentials; keep them out of debug output.
impl fmt::Debug for EncodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedToken([redacted; {} chars])", self.0.len())
    }
}

/// Wire payload: the claims plus the issuer they were minted by.
#[derive(Serialize)]
struct SignedPayload<'a> {
    iss: &'a str,
    #[serde(flatten)]
    claims: &'a TokenClaims,
}

/// Encodes and decodes signed tokens for one issuer.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    issuer: String,
}

impl TokenCodec {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign claims into a token
    ///
    /// # Errors
    /// Returns `CodecError::Encoding` if serialization or signing fails
    pub fn encode(
        &self,
        claims: &TokenClaims,
        secret: &SigningSecret,
    ) -> Result<EncodedToken, CodecError> {
        let payload = SignedPayload {
            iss: &self.issuer,
            claims,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map(EncodedToken)
        .map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Verify a token's signature and issuer and return its claims
    ///
    /// Expiry is *not* checked here.
    ///
    /// # Errors
    /// - `InvalidSignature` if the token was not signed with `secret`
    /// - `Malformed` if it cannot be parsed or names another issuer
    pub fn decode(&self, token: &str, secret: &SigningSecret) -> Result<TokenClaims, CodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.set_issuer(&[&self.issuer]);

        decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => CodecError::InvalidSignature,
            _ => CodecError::Malformed(e.to_string()),
        })
    }
}
