use std::sync::Arc;

use authcore::auth::{
    require_admin, AuthService, InMemoryCredentialStore, NewUser, PasswordHasher, Requirement,
    Role, SigningSecret,
};
use authcore::configuration::get_configuration;
use authcore::telemetry::init_telemetry;

fn startup_error(message: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting authcore demo");

    let mut configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error("Configuration error"));
        }
    };

    if configuration.auth.signing_secret.is_empty() {
        tracing::warn!(
            "No signing secret configured (AUTHCORE__AUTH__SIGNING_SECRET); \
             generating an ephemeral one. Tokens will not survive a restart."
        );
        let secret = SigningSecret::generate();
        configuration.auth.signing_secret = String::from_utf8_lossy(secret.as_bytes()).into_owned();
    }

    let credentials = Arc::new(InMemoryCredentialStore::new(PasswordHasher::new(
        configuration.credentials.bcrypt_cost,
    )));
    let seed = [
        NewUser::new("alice", "Admin1234", Role::Admin),
        NewUser::new("bob", "Manager1234", Role::Manager),
        NewUser::new("charlie", "User12345", Role::User),
    ];
    for user in seed {
        if let Err(e) = credentials.register(user).await {
            tracing::error!("Failed to seed user: {}", e);
            return Err(startup_error("Seed error"));
        }
    }

    let service = match AuthService::builder(configuration)
        .credentials(credentials)
        .build()
    {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(startup_error("Configuration error"));
        }
    };
    let janitor = service.spawn_janitor();

    if let Err(e) = run_scenario(&service).await {
        tracing::error!(error = %e, code = e.code(), "Demo scenario failed");
    }

    janitor.abort();
    Ok(())
}

async fn run_scenario(service: &AuthService) -> Result<(), authcore::error::AuthError> {
    let first = service.login("alice", "Admin1234").await?;
    tracing::info!(expires_in = first.expires_in, "alice logged in");

    let identity = service.validate(first.access_token.as_str())?;
    tracing::info!(subject = %identity.subject, role = %identity.role, "Access token validated");

    let admin_only = service.authorize(&identity, &require_admin());
    tracing::info!(allowed = admin_only, "Admin-only operation");

    let second = service.refresh(first.refresh_token.as_str()).await?;
    tracing::info!("Refresh token rotated");

    match service.refresh(first.refresh_token.as_str()).await {
        Err(e) if e.is_security_event() => {
            tracing::info!(code = e.code(), "Replay of the rotated token was refused");
        }
        other => {
            tracing::error!(result = ?other.map(|_| ()), "Replay was not refused");
        }
    }

    let identity = service.validate(second.access_token.as_str())?;
    tracing::info!(subject = %identity.subject, "Rotated access token validated");

    if let Ok(write_items) = Requirement::scope("items:write") {
        let allowed = service.validate_and_authorize(second.access_token.as_str(), &write_items)?;
        tracing::info!(allowed, "items:write check");
    }

    service.logout(second.refresh_token.as_str()).await;
    tracing::info!("alice logged out");

    Ok(())
}
