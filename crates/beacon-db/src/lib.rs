//! Beacon Database Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Repository interfaces over plain records. Each repository owns its rows
//! exclusively and every mutation is a single-row atomic write, so callers
//! never need in-process locks of their own.
//!
//! Two backends are provided:
//! - [`memory`]: `tokio::sync::RwLock` guarded maps, used by tests and the
//!   `memory` backend
//! - [`postgres`]: sqlx repositories over a shared `PgPool`

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use beacon_common::{
    config::{DatabaseBackend, DatabaseConfig},
    Broadcast, DiscoveryError, PresenceRecord, RankingWeights, Result, UserId,
};
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;

pub use memory::{MemoryBroadcastRepository, MemoryPresenceRepository, MemoryWeightsRepository};

/// Name under which the active weight set is stored
pub const DEFAULT_WEIGHTS_NAME: &str = "default";

/// Storage of [`PresenceRecord`] rows
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<PresenceRecord>>;

    /// Upserts `is_available`. `last_available_at` is never modified here.
    async fn set_available(
        &self,
        user_id: &str,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<PresenceRecord>;

    /// Upserts `is_available = true, last_available_at = now`
    async fn heartbeat(&self, user_id: &str, now: DateTime<Utc>) -> Result<PresenceRecord>;

    /// Available users, most recent heartbeat first, ties by user id
    async fn list_available(&self, limit: usize, offset: usize)
        -> Result<(Vec<PresenceRecord>, u64)>;

    /// The full available set in listing order
    async fn all_available(&self) -> Result<Vec<PresenceRecord>>;

    /// Marks available users whose last heartbeat is older than `cutoff`
    /// as unavailable. Returns the number of rows changed.
    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Storage of [`Broadcast`] rows, keyed by user id
#[async_trait]
pub trait BroadcastRepository: Send + Sync {
    /// Raw row for a user, whatever its state
    async fn get(&self, user_id: &str) -> Result<Option<Broadcast>>;

    /// Replaces the user's row in a single upsert
    async fn upsert(&self, broadcast: Broadcast) -> Result<Broadcast>;

    /// Updates the message (and the expiry when given) of a row that is
    /// active and not expired at `now`. `None` when there is no such row.
    async fn update_active(
        &self,
        user_id: &str,
        message: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Broadcast>>;

    /// Marks the row inactive. Returns whether a row changed.
    async fn deactivate(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Active, unexpired rows for the given users in one lookup
    async fn get_active_for_users(
        &self,
        user_ids: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<HashMap<UserId, Broadcast>>;

    /// Deactivates every active row with `expires_at < now`
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Hard-deletes inactive rows deactivated before `cutoff`
    async fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Storage of named [`RankingWeights`] sets
#[async_trait]
pub trait WeightsRepository: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<RankingWeights>>;

    async fn store(&self, name: &str, weights: &RankingWeights) -> Result<()>;
}

/// The three repositories of one backend
#[derive(Clone)]
pub struct Repositories {
    pub presence: Arc<dyn PresenceRepository>,
    pub broadcasts: Arc<dyn BroadcastRepository>,
    pub weights: Arc<dyn WeightsRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

impl Repositories {
    /// Fresh in-memory repositories
    pub fn in_memory() -> Self {
        Self {
            presence: Arc::new(MemoryPresenceRepository::default()),
            broadcasts: Arc::new(MemoryBroadcastRepository::default()),
            weights: Arc::new(MemoryWeightsRepository::default()),
        }
    }

    /// Open the configured backend. The postgres backend bootstraps its
    /// schema before returning.
    #[instrument(level = "debug", skip(config), fields(backend = ?config.backend))]
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        match config.backend {
            DatabaseBackend::Memory => {
                info!("🗄️ Using in-memory storage");
                Ok(Self::in_memory())
            }
            DatabaseBackend::Postgres => {
                let pool = pool::create_pool(config).await?;
                if !pool::check_pool_health(&pool).await? {
                    return Err(DiscoveryError::Storage("database health check failed".into()));
                }
                migrations::run_migrations(&pool).await?;
                Ok(postgres::repositories(pool))
            }
        }
    }
}
