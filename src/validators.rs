/// Input validators for account names and permission scopes
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Enumeration hygiene: one canonical spelling per username
/// 3. Scope grammar: `resource:action`, checked once at registration time

use regex::Regex;
use lazy_static::lazy_static;

use crate::error::ValidationError;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MAX_SCOPE_LENGTH: usize = 64;

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();

    // e.g. items:read, users:delete, billing-reports:export
    static ref SCOPE_REGEX: Regex =
        Regex::new(r"^[a-z][a-z0-9_-]*:[a-z][a-z0-9_-]*$").unwrap();
}

/// Validates a username
/// - Trims surrounding whitespace
/// - Checks length constraints
/// - Restricts to ASCII letters, digits, `_`, `.` and `-`
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if trimmed.len() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort("username".to_string(), MIN_USERNAME_LENGTH));
    }

    if trimmed.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username".to_string(), MAX_USERNAME_LENGTH));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a permission scope string of the form `resource:action`
pub fn is_valid_scope(scope: &str) -> Result<(), ValidationError> {
    if scope.is_empty() {
        return Err(ValidationError::EmptyField("scope".to_string()));
    }

    if scope.len() > MAX_SCOPE_LENGTH {
        return Err(ValidationError::TooLong("scope".to_string(), MAX_SCOPE_LENGTH));
    }

    if !SCOPE_REGEX.is_match(scope) {
        return Err(ValidationError::InvalidFormat("scope".to_string()));
    }

    Ok(())
}
