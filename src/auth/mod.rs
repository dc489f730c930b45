/// Authentication module
///
/// Handles token issuance and validation, refresh-token rotation with reuse
/// detection, revocation, password hashing and role/scope authorization.

mod authorize;
mod claims;
mod codec;
mod credentials;
mod identity;
mod issuer;
mod password;
mod refresh;
mod revocation;
mod secret;
mod service;
mod validator;

pub use authorize::{
    authorize, require_admin, require_manager, require_user, Requirement, RoleRequirement,
    ScopeRequirement,
};
pub use claims::{TokenClaims, TokenKind};
pub use codec::{EncodedToken, TokenCodec};
pub use credentials::{CredentialStore, InMemoryCredentialStore, NewUser, UserRecord};
pub use identity::{Identity, Role};
pub use issuer::{TokenIssuer, TokenPair, TOKEN_TYPE_BEARER};
pub use password::{validate_password_strength, verify_password, PasswordHasher};
pub use refresh::RefreshCoordinator;
pub use revocation::{
    spawn_revocation_janitor, InMemoryRevocationStore, RevocationEntry, RevocationRegistry,
    RevocationStore,
};
pub use secret::{SecretProvider, SigningSecret, StaticSecretProvider};
pub use service::{AuthService, AuthServiceBuilder};
pub use validator::AccessValidator;
