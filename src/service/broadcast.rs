//! Ephemeral broadcast messages
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! One row per user. Creating replaces whatever the user had before,
//! deleting and expiring only deactivate, and the retention purge removes
//! rows for good.

use std::{collections::HashMap, sync::Arc};

use beacon_common::{config::BroadcastConfig, Broadcast, DiscoveryError, Result, UserId};
use beacon_db::BroadcastRepository;
use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::ensure_user_id;

#[derive(Clone)]
pub struct BroadcastService {
    repo: Arc<dyn BroadcastRepository>,
    config: BroadcastConfig,
}

impl std::fmt::Debug for BroadcastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BroadcastService {
    pub fn new(repo: Arc<dyn BroadcastRepository>, config: BroadcastConfig) -> Self {
        Self { repo, config }
    }

    /// Trimmed message, 1 to `max_message_len` characters
    fn validate_message(&self, message: &str) -> Result<String> {
        let trimmed = message.trim();
        let len = trimmed.chars().count();
        if len == 0 {
            return Err(DiscoveryError::validation("broadcast message must not be empty"));
        }
        if len > self.config.max_message_len {
            return Err(DiscoveryError::validation(format!(
                "broadcast message is {len} characters, the limit is {}",
                self.config.max_message_len
            )));
        }
        Ok(trimmed.to_owned())
    }

    fn validate_ttl(&self, ttl_hours: Option<i64>) -> Result<Option<Duration>> {
        let max = i64::from(self.config.max_ttl_hours);
        match ttl_hours {
            None => Ok(None),
            Some(hours) if (1..=max).contains(&hours) => Ok(Some(Duration::hours(hours))),
            Some(hours) => Err(DiscoveryError::validation(format!(
                "ttl_hours must be between 1 and {max}, got {hours}"
            ))),
        }
    }

    /// Create or replace the user's broadcast
    #[instrument(level = "debug", skip(self, message))]
    pub async fn create(&self, user_id: &str, message: &str, ttl_hours: Option<i64>) -> Result<Broadcast> {
        ensure_user_id(user_id)?;
        let message = self.validate_message(message)?;
        let ttl = self
            .validate_ttl(ttl_hours)?
            .unwrap_or_else(|| Duration::hours(i64::from(self.config.default_ttl_hours)));

        let now = Utc::now();
        let broadcast = Broadcast {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            message,
            is_active: true,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let stored = self.repo.upsert(broadcast).await?;
        counter!("beacon_broadcasts_created_total").increment(1);
        debug!("📣 Broadcast {} from {} until {}", stored.id, user_id, stored.expires_at);
        Ok(stored)
    }

    /// Change the message of the active broadcast; a ttl resets the expiry
    #[instrument(level = "debug", skip(self, message))]
    pub async fn update(&self, user_id: &str, message: &str, ttl_hours: Option<i64>) -> Result<Broadcast> {
        ensure_user_id(user_id)?;
        let message = self.validate_message(message)?;
        let ttl = self.validate_ttl(ttl_hours)?;

        let now = Utc::now();
        self.repo
            .update_active(user_id, &message, ttl.map(|ttl| now + ttl), now)
            .await?
            .ok_or_else(|| DiscoveryError::not_found(format!("active broadcast for {user_id}")))
    }

    /// Deactivate the user's broadcast. Deleting twice is fine.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete(&self, user_id: &str) -> Result<()> {
        ensure_user_id(user_id)?;
        if self.repo.deactivate(user_id, Utc::now()).await? {
            counter!("beacon_broadcasts_deleted_total").increment(1);
        } else {
            debug!("No active broadcast to delete for {}", user_id);
        }
        Ok(())
    }

    /// The user's broadcast if it is active and not yet expired
    #[instrument(level = "debug", skip(self))]
    pub async fn get_active(&self, user_id: &str) -> Result<Broadcast> {
        ensure_user_id(user_id)?;
        let now = Utc::now();
        self.repo
            .get(user_id)
            .await?
            .filter(|broadcast| broadcast.is_visible(now))
            .ok_or_else(|| DiscoveryError::not_found(format!("active broadcast for {user_id}")))
    }

    /// Active broadcasts for many users in one lookup
    pub async fn get_active_for_users(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, Broadcast>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.repo.get_active_for_users(user_ids, Utc::now()).await
    }

    /// Deactivate every broadcast past its expiry
    #[instrument(level = "debug", skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64> {
        let swept = self.repo.deactivate_expired(Utc::now()).await?;
        counter!("beacon_broadcasts_swept_total").increment(swept);
        if swept > 0 {
            info!("🧹 Deactivated {} expired broadcasts", swept);
        }
        Ok(swept)
    }

    /// Hard-delete rows that have been inactive for longer than `retention`
    #[instrument(level = "debug", skip(self))]
    pub async fn purge_old(&self, retention: Duration) -> Result<u64> {
        if retention < Duration::zero() {
            return Err(DiscoveryError::validation("retention must not be negative"));
        }
        let cutoff = Utc::now().checked_sub_signed(retention).ok_or_else(|| {
            DiscoveryError::validation(format!("retention of {} days is out of range", retention.num_days()))
        })?;
        let purged = self.repo.purge_inactive_before(cutoff).await?;
        counter!("beacon_broadcasts_purged_total").increment(purged);
        if purged > 0 {
            info!("🗑️ Purged {} broadcasts inactive for more than {} days", purged, retention.num_days());
        }
        Ok(purged)
    }

    /// Purge with the configured retention
    pub async fn purge_expired_rows(&self) -> Result<u64> {
        self.purge_old(self.config.retention()).await
    }
}
