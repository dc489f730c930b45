use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use authcore::auth::{
    require_admin, require_manager, require_user, AuthService, InMemoryCredentialStore, NewUser,
    PasswordHasher, Requirement, RevocationEntry, RevocationStore, Role, RoleRequirement,
    SigningSecret, TokenCodec, TokenPair,
};
use authcore::clock::ManualClock;
use authcore::configuration::{AuthSettings, CredentialSettings, RevocationSettings, Settings};
use authcore::error::{AuthError, StoreError};

const SECRET: &str = "integration-secret-key-at-least-32-chars";

pub struct TestApp {
    pub service: Arc<AuthService>,
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<InMemoryCredentialStore>,
}

fn start() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

fn settings() -> Settings {
    Settings {
        auth: AuthSettings {
            signing_secret: SECRET.to_string(),
            issuer: "authcore-test".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
        },
        revocation: RevocationSettings {
            store_ttl_floor_secs: 604_800,
            store_timeout_ms: 500,
            purge_interval_secs: 300,
        },
        credentials: CredentialSettings { bcrypt_cost: 4 },
    }
}

async fn spawn_app_with(store: Option<Arc<dyn RevocationStore>>) -> TestApp {
    let clock = Arc::new(ManualClock::new(start()));
    let credentials = Arc::new(InMemoryCredentialStore::new(PasswordHasher::new(4)));
    credentials
        .register(NewUser::new("alice", "Admin1234", Role::Admin))
        .await
        .expect("Failed to seed alice");
    credentials
        .register(
            NewUser::new("maria", "Manager1234", Role::Manager).with_scopes(["items:read"]),
        )
        .await
        .expect("Failed to seed maria");

    let mut builder = AuthService::builder(settings())
        .clock(clock.clone())
        .credentials(credentials.clone());
    if let Some(store) = store {
        builder = builder.revocation_store(store);
    }
    let service = builder.build().expect("Failed to build service");

    TestApp {
        service: Arc::new(service),
        clock,
        credentials,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(None).await
}

fn token_ids(pair: &TokenPair) -> (String, String) {
    let codec = TokenCodec::new("authcore-test");
    let secret = SigningSecret::new(SECRET);
    let access = codec.decode(pair.access_token.as_str(), &secret).unwrap();
    let refresh = codec.decode(pair.refresh_token.as_str(), &secret).unwrap();
    (access.token_id, refresh.token_id)
}

// --- End-to-end ---

#[tokio::test]
async fn login_validate_refresh_replay_scenario() {
    let app = spawn_app().await;

    let a = app.service.login("alice", "Admin1234").await.unwrap();
    let identity = app.service.validate(a.access_token.as_str()).unwrap();
    assert_eq!(identity.subject, "alice");
    assert_eq!(identity.role, Role::Admin);

    let b = app.service.refresh(a.refresh_token.as_str()).await.unwrap();
    let (a_access, a_refresh) = token_ids(&a);
    let (b_access, b_refresh) = token_ids(&b);
    assert_ne!(a_access, b_access);
    assert_ne!(a_refresh, b_refresh);

    assert_eq!(
        app.service.refresh(a.refresh_token.as_str()).await.unwrap_err(),
        AuthError::TokenReuseDetected
    );
    assert!(app.service.validate(b.access_token.as_str()).is_ok());
}

#[tokio::test]
async fn issued_tokens_carry_kind_and_subject() {
    let app = spawn_app().await;
    let pair = app.service.login("maria", "Manager1234").await.unwrap();

    assert_eq!(app.service.validate(pair.access_token.as_str()).unwrap().subject, "maria");
    assert_eq!(
        app.service.validate(pair.refresh_token.as_str()).unwrap_err(),
        AuthError::WrongTokenKind
    );
    assert_eq!(
        app.service.refresh(pair.access_token.as_str()).await.unwrap_err(),
        AuthError::WrongTokenKind
    );
}

// --- Single use ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_has_exactly_one_winner() {
    let app = spawn_app().await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();

    let token = pair.refresh_token.into_string();
    let first = {
        let service = app.service.clone();
        let token = token.clone();
        tokio::spawn(async move { service.refresh(&token).await })
    };
    let second = {
        let service = app.service.clone();
        let token = token.clone();
        tokio::spawn(async move { service.refresh(&token).await })
    };
    let (first, second) = futures::join!(first, second);
    let results = [first.unwrap(), second.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let reused = results
        .iter()
        .filter(|r| matches!(r, Err(AuthError::TokenReuseDetected)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(reused, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_refreshes_still_one_winner() {
    let app = spawn_app().await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();
    let token = pair.refresh_token.into_string();

    let attempts = (0..16).map(|_| {
        let service = app.service.clone();
        let token = token.clone();
        tokio::spawn(async move { service.refresh(&token).await })
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn replay_after_rotation_is_reuse_not_expired() {
    let app = spawn_app().await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();
    app.service.refresh(pair.refresh_token.as_str()).await.unwrap();

    // Well inside the original token's lifetime
    app.clock.advance(Duration::days(3));
    assert_eq!(
        app.service.refresh(pair.refresh_token.as_str()).await.unwrap_err(),
        AuthError::TokenReuseDetected
    );
}

// --- Expiry ---

#[tokio::test]
async fn access_expiry_boundary_is_exclusive() {
    let app = spawn_app().await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();
    let expires_at = start() + Duration::seconds(900);
    assert_eq!(pair.access_expires_at, expires_at);

    app.clock.set(expires_at - Duration::milliseconds(1));
    assert!(app.service.validate(pair.access_token.as_str()).is_ok());

    app.clock.set(expires_at);
    assert_eq!(
        app.service.validate(pair.access_token.as_str()).unwrap_err(),
        AuthError::Expired
    );

    app.clock.set(expires_at + Duration::milliseconds(1));
    assert_eq!(
        app.service.validate(pair.access_token.as_str()).unwrap_err(),
        AuthError::Expired
    );
}

#[tokio::test]
async fn expired_refresh_token_is_expired_not_reuse() {
    let app = spawn_app().await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();

    app.clock.set(pair.refresh_expires_at);
    assert_eq!(
        app.service.refresh(pair.refresh_token.as_str()).await.unwrap_err(),
        AuthError::Expired
    );
}

// --- Logout ---

#[tokio::test]
async fn logout_is_idempotent_and_kills_the_refresh_token() {
    let app = spawn_app().await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();

    app.service.logout(pair.refresh_token.as_str()).await;
    app.service.logout(pair.refresh_token.as_str()).await;

    assert_eq!(
        app.service.refresh(pair.refresh_token.as_str()).await.unwrap_err(),
        AuthError::TokenReuseDetected
    );
    // Outstanding access tokens live out their lifetime
    assert!(app.service.validate(pair.access_token.as_str()).is_ok());
}

#[tokio::test]
async fn logout_with_garbage_does_not_fail() {
    let app = spawn_app().await;
    app.service.logout("not-a-token").await;
    assert_eq!(app.service.registry().len().await.unwrap(), 0);
}

// --- Authorization ---

#[tokio::test]
async fn authorization_composition() {
    let app = spawn_app().await;
    let pair = app.service.login("maria", "Manager1234").await.unwrap();
    let identity = app.service.validate(pair.access_token.as_str()).unwrap();

    assert!(!app.service.authorize(&identity, &require_admin()));
    assert!(!app
        .service
        .authorize(&identity, &Requirement::scope("items:write").unwrap()));

    let manager_reader =
        Requirement::role_with_scopes(RoleRequirement::Exact(Role::Manager), ["items:read"])
            .unwrap();
    assert!(app.service.authorize(&identity, &manager_reader));
    assert!(app.service.authorize(&identity, &require_manager()));
    assert!(app.service.authorize(&identity, &require_user()));
}

#[tokio::test]
async fn demotion_applies_at_next_refresh() {
    let app = spawn_app().await;
    let pair = app.service.login("maria", "Manager1234").await.unwrap();
    app.credentials.set_role("maria", Role::User).unwrap();

    let rotated = app.service.refresh(pair.refresh_token.as_str()).await.unwrap();
    assert_eq!(
        app.service
            .validate_and_authorize(rotated.access_token.as_str(), &require_manager()),
        Ok(false)
    );
}

// --- Infrastructure ---

struct UnreachableStore;

#[async_trait]
impl RevocationStore for UnreachableStore {
    async fn insert_if_absent(&self, _entry: RevocationEntry) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn contains(&self, _token_id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn store_outage_is_retryable_infrastructure_error() {
    let app = spawn_app_with(Some(Arc::new(UnreachableStore))).await;
    let pair = app.service.login("alice", "Admin1234").await.unwrap();

    let err = app.service.refresh(pair.refresh_token.as_str()).await.unwrap_err();
    assert!(matches!(err, AuthError::Infrastructure(_)));
    assert!(err.is_retryable());
    assert!(!err.is_security_event());

    // Logout swallows the outage; validation never touches the store
    app.service.logout(pair.refresh_token.as_str()).await;
    assert!(app.service.validate(pair.access_token.as_str()).is_ok());
}
