//! Signing secrets and where they come from.

use std::fmt;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// HMAC signing key material. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(bytes.as_ref()))
    }

    /// Random 64-character alphanumeric secret, for development setups
    /// that have not configured one.
    pub fn generate() -> Self {
        let secret: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        Self::new(secret)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret([redacted; {} bytes])", self.0.len())
    }
}

/// Supplies the secret the codec signs and verifies with.
///
/// Passed per call rather than held globally so keys can rotate later
/// without touching the codec.
pub trait SecretProvider: Send + Sync {
    fn signing_secret(&self) -> SigningSecret;
}

/// A single fixed secret, typically loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticSecretProvider {
    secret: SigningSecret,
}

impl StaticSecretProvider {
    pub fn new(secret: SigningSecret) -> Self {
        Self { secret }
    }
}

impl SecretProvider for StaticSecretProvider {
    fn signing_secret(&self) -> SigningSecret {
        self.secret.clone()
    }
}
