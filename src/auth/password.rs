//! Password Hashing and Verification
//!
//! bcrypt with a configurable cost, plus the strength rules applied when an
//! account is registered. Plaintext never reaches a log line.

use bcrypt::{hash, verify};

use crate::error::{CredentialError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_LENGTH: usize = 72;

/// Slow salted hasher. Stateless apart from its cost factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with a fresh salt
    ///
    /// # Errors
    /// Returns error if bcrypt rejects the cost or the input
    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        hash(password, self.cost).map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Verify a password against its hash.
    ///
    /// A malformed hash verifies as `false`; it never surfaces as an error.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        verify_password(password, password_hash)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

/// Verify a password against a bcrypt hash, treating malformed hashes as a mismatch
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            false
        }
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 72 bytes (bcrypt's input limit)
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        ));
    }

    Ok(())
}
