//! Error Handling Module
//!
//! Every failure that crosses the core boundary is a typed value, never a
//! free-text message. The layout follows the rest of the crate:
//! 1. Domain-specific error types (codec, store, credentials, config)
//! 2. The authentication taxonomy callers pattern-match on (`AuthError`)
//! 3. Conversions between them
//! 4. Structured error logging with context

use thiserror::Error;

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Input validation errors (usernames, passwords)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(String),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(String, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
}

/// Token codec failures.
///
/// Expiry is deliberately absent: an expired token still decodes, and the
/// caller decides what an old `expires_at` means.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("token signature does not verify")]
    InvalidSignature,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Failures of an external backing store (revocation or credentials)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out after {0}ms")]
    Timeout(u64),
    #[error("store error: {0}")]
    Backend(String),
}

/// Credential store administration errors (registration, role changes)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("username already registered")]
    DuplicateUser,
    #[error("user not found")]
    UnknownUser,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rejected authorization requirement, raised when a route registers it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    #[error("scope is empty")]
    EmptyScope,
    #[error("scope `{0}` must have the form resource:action without whitespace")]
    InvalidScope(String),
    #[error("role requirement lists no roles")]
    NoRoles,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required config: {0}")]
    MissingRequired(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
    #[error("Config parse error: {0}")]
    Parse(#[from] config::ConfigError),
}

// ============================================================================
// 2. AUTHENTICATION TAXONOMY
// ============================================================================

/// Errors returned by `login`, `validate` and `refresh`.
///
/// `TokenReuseDetected` is never folded into `Unauthenticated`: callers may
/// answer the client with the same status for both, but logs and metrics must
/// keep the distinction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Bad credentials, or a token that is malformed or not signed by us.
    #[error("authentication failed")]
    Unauthenticated,
    /// An access token was presented where a refresh token was expected, or vice versa.
    #[error("wrong token kind")]
    WrongTokenKind,
    /// Structurally valid token past its `expires_at`.
    #[error("token has expired")]
    Expired,
    /// A refresh token that was already rotated or logged out was presented again.
    #[error("refresh token reuse detected")]
    TokenReuseDetected,
    /// The revocation store was unreachable or timed out. Retryable.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
    /// Token encoding failed. Not reachable with a valid HMAC key.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::WrongTokenKind => "WRONG_TOKEN_KIND",
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::TokenReuseDetected => "TOKEN_REUSE_DETECTED",
            AuthError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this failure should be reported as a security event.
    pub fn is_security_event(&self) -> bool {
        matches!(self, AuthError::TokenReuseDetected)
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Infrastructure(_))
    }
}

// ============================================================================
// 3. CONVERSIONS
// ============================================================================

impl From<CodecError> for AuthError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidSignature | CodecError::Malformed(_) => AuthError::Unauthenticated,
            CodecError::Encoding(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Infrastructure(err.to_string())
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for structured logging of failed operations
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub subject: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            subject: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn log_error(&self, error: &AuthError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "subject": self.subject,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AuthError::TokenReuseDetected => {
                tracing::error!(
                    error = %error,
                    code = error.code(),
                    security_event = true,
                    context = ?context,
                    "Refresh token reuse detected"
                );
            }
            AuthError::Infrastructure(_) | AuthError::Internal(_) => {
                tracing::error!(
                    error = %error,
                    code = error.code(),
                    context = ?context,
                    "Authentication infrastructure error"
                );
            }
            _ => {
                tracing::warn!(
                    error = %error,
                    code = error.code(),
                    context = ?context,
                    "Authentication error"
                );
            }
        }
    }
}
