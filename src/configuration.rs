use std::fmt;

use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;
// Ten years; keeps `now + ttl` far inside chrono's range
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub auth: AuthSettings,
    pub revocation: RevocationSettings,
    pub credentials: CredentialSettings,
}

/// Token issuance settings
#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    pub signing_secret: String,
    pub issuer: String,
    pub access_token_ttl_secs: i64,  // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_ttl_secs: i64, // seconds (e.g., 604800 for 7 days)
}

impl AuthSettings {
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_ttl_secs)
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("signing_secret", &"[redacted]")
            .field("issuer", &self.issuer)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}

/// Revocation registry settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RevocationSettings {
    /// Longest retention of a single entry; must cover a full refresh lifetime.
    pub store_ttl_floor_secs: i64,
    pub store_timeout_ms: u64,
    pub purge_interval_secs: u64,
}

impl RevocationSettings {
    pub fn store_ttl_floor(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.store_ttl_floor_secs)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }

    pub fn purge_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.purge_interval_secs)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct CredentialSettings {
    pub bcrypt_cost: u32,
}

impl Settings {
    /// Check cross-field constraints that deserialization cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let auth = &self.auth;
        if auth.signing_secret.is_empty() {
            return Err(ConfigError::MissingRequired("auth.signing_secret".to_string()));
        }
        if auth.signing_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "auth.signing_secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if auth.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.issuer".to_string()));
        }
        if auth.access_token_ttl_secs <= 0 || auth.refresh_token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be positive".to_string(),
            ));
        }
        for (name, secs) in [
            ("auth.access_token_ttl_secs", auth.access_token_ttl_secs),
            ("auth.refresh_token_ttl_secs", auth.refresh_token_ttl_secs),
            ("revocation.store_ttl_floor_secs", self.revocation.store_ttl_floor_secs),
        ] {
            if secs > MAX_TTL_SECS {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at most {} seconds",
                    name, MAX_TTL_SECS
                )));
            }
        }
        if auth.access_token_ttl_secs >= auth.refresh_token_ttl_secs {
            return Err(ConfigError::InvalidValue(
                "auth.access_token_ttl_secs must be shorter than auth.refresh_token_ttl_secs"
                    .to_string(),
            ));
        }
        if self.revocation.store_ttl_floor_secs < auth.refresh_token_ttl_secs {
            return Err(ConfigError::InvalidValue(
                "revocation.store_ttl_floor_secs must be >= auth.refresh_token_ttl_secs"
                    .to_string(),
            ));
        }
        if self.revocation.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "revocation.store_timeout_ms must be positive".to_string(),
            ));
        }
        if self.revocation.purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "revocation.purge_interval_secs must be positive".to_string(),
            ));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.credentials.bcrypt_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "credentials.bcrypt_cost must be within {}..={}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST
            )));
        }
        Ok(())
    }
}

/// Load settings from `configuration.*` (optional) and `AUTHCORE__*` env vars.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("auth.signing_secret", "")?
        .set_default("auth.issuer", "authcore")?
        .set_default("auth.access_token_ttl_secs", 900_i64)?
        .set_default("auth.refresh_token_ttl_secs", 604_800_i64)?
        .set_default("revocation.store_ttl_floor_secs", 604_800_i64)?
        .set_default("revocation.store_timeout_ms", 2_000_i64)?
        .set_default("revocation.purge_interval_secs", 300_i64)?
        .set_default("credentials.bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("AUTHCORE")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    Ok(settings)
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        auth: AuthSettings {
            signing_secret: "test-secret-key-at-least-32-characters-long".to_string(),
            issuer: "test".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
        },
        revocation: RevocationSettings {
            store_ttl_floor_secs: 604_800,
            store_timeout_ms: 2_000,
            purge_interval_secs: 300,
        },
        credentials: CredentialSettings { bcrypt_cost: 4 },
    }
}
