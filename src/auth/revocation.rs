//! Revocation Registry
//!
//! Tracks refresh-token ids that were rotated or logged out so they cannot be
//! presented again before they expire. This is the only shared mutable state
//! in the crate.
//!
//! Entries are retained until the revoked token's own `expires_at`: once the
//! token is past expiry the codec-level expiry check rejects it anyway, so the
//! entry carries no further information and may be purged.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::error::{AuthError, StoreError};

/// One revoked token id. Created once, never updated, removed only by purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationEntry {
    pub token_id: String,
    pub revoked_at: DateTime<Utc>,
    pub retain_until: DateTime<Utc>,
}

/// Backing store for revoked token ids.
///
/// Implementations must make `insert_if_absent` atomic per key: of any number
/// of concurrent calls for the same id, exactly one observes `true`. A
/// completed insert must be visible to every `contains` that starts after it.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Insert `entry` unless its id is already present.
    ///
    /// Returns `true` if this call created the entry.
    async fn insert_if_absent(&self, entry: RevocationEntry) -> Result<bool, StoreError>;

    async fn contains(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Delete entries whose `retain_until` is at or before `now`.
    ///
    /// Returns the number of entries removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

/// Single-process store on a sharded concurrent map
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, RevocationEntry>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn insert_if_absent(&self, entry: RevocationEntry) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock across the check and the insert
        match self.entries.entry(entry.token_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    async fn contains(&self, token_id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(token_id))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.retain_until > now);
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}

/// Revocation policy over a backing store: retention, timeouts, error mapping
pub struct RevocationRegistry {
    store: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
    ttl_floor: Duration,
    timeout: std::time::Duration,
}

impl RevocationRegistry {
    pub fn new(
        store: Arc<dyn RevocationStore>,
        clock: Arc<dyn Clock>,
        ttl_floor: Duration,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl_floor,
            timeout,
        }
    }

    /// Revoke a token id. Revoking an already-revoked id is a no-op.
    pub async fn revoke(
        &self,
        token_id: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let newly_revoked = self.revoke_if_absent(token_id, token_expires_at).await?;
        if !newly_revoked {
            tracing::debug!(token_id = %token_id, "Token id was already revoked");
        }
        Ok(())
    }

    /// Atomically revoke a token id unless it is already revoked.
    ///
    /// Returns `true` if this call performed the revocation. This is the
    /// single check-and-set primitive that refresh rotation relies on.
    pub async fn revoke_if_absent(
        &self,
        token_id: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let entry = self.entry_for(token_id, token_expires_at);
        self.with_timeout(self.store.insert_if_absent(entry)).await
    }

    pub async fn is_revoked(&self, token_id: &str) -> Result<bool, AuthError> {
        self.with_timeout(self.store.contains(token_id)).await
    }

    /// Drop entries whose tokens have expired.
    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        let now = self.clock.now();
        self.with_timeout(self.store.purge_expired(now)).await
    }

    pub async fn len(&self) -> Result<usize, AuthError> {
        self.with_timeout(self.store.len()).await
    }

    fn entry_for(&self, token_id: &str, token_expires_at: DateTime<Utc>) -> RevocationEntry {
        let revoked_at = self.clock.now();
        let ceiling = revoked_at
            .checked_add_signed(self.ttl_floor)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if token_expires_at > ceiling {
            tracing::warn!(
                token_id = %token_id,
                expires_at = %token_expires_at,
                "Token outlives the revocation retention limit; clamping retention"
            );
        }
        RevocationEntry {
            token_id: token_id.to_string(),
            revoked_at,
            retain_until: token_expires_at.min(ceiling),
        }
    }

    async fn with_timeout<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!(error = %e, "Revocation store error");
                AuthError::from(e)
            }),
            Err(_) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                let err = StoreError::Timeout(millis);
                tracing::error!(error = %err, "Revocation store timed out");
                Err(err.into())
            }
        }
    }
}

/// Periodically purge expired revocation entries until the handle is aborted.
pub fn spawn_revocation_janitor(
    registry: Arc<RevocationRegistry>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match registry.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => {
                    tracing::info!(purged, "Purged expired revocation entries");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Revocation purge failed; will retry");
                }
            }
        }
    })
}
