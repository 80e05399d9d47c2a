//! Presence tracking
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use std::{sync::Arc, time::Duration};

use beacon_common::{
    config::PresenceConfig, DiscoveryError, Page, PresenceRecord, Result,
};
use beacon_db::PresenceRepository;
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, instrument};

use super::{ensure_user_id, page_bounds};

/// Availability flag and heartbeat timestamp per user
#[derive(Clone)]
pub struct PresenceService {
    repo: Arc<dyn PresenceRepository>,
    max_page_size: usize,
    offline_timeout: Duration,
}

impl std::fmt::Debug for PresenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceService")
            .field("max_page_size", &self.max_page_size)
            .field("offline_timeout", &self.offline_timeout)
            .finish_non_exhaustive()
    }
}

impl PresenceService {
    pub fn new(repo: Arc<dyn PresenceRepository>, config: &PresenceConfig) -> Self {
        Self {
            repo,
            max_page_size: config.max_page_size,
            offline_timeout: config.offline_timeout(),
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Mark the user available and stamp the heartbeat time
    #[instrument(level = "debug", skip(self))]
    pub async fn heartbeat(&self, user_id: &str) -> Result<PresenceRecord> {
        ensure_user_id(user_id)?;
        let record = self.repo.heartbeat(user_id, Utc::now()).await?;
        counter!("beacon_heartbeats_total").increment(1);
        debug!("💓 Heartbeat from {}", user_id);
        Ok(record)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_availability(&self, user_id: &str) -> Result<PresenceRecord> {
        ensure_user_id(user_id)?;
        self.repo
            .get(user_id)
            .await?
            .ok_or_else(|| DiscoveryError::not_found(format!("presence for {user_id}")))
    }

    /// Flip the availability flag. Going available stamps `last_available_at`;
    /// going unavailable leaves it as the last time the user was available.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_availability(&self, user_id: &str, is_available: bool) -> Result<PresenceRecord> {
        ensure_user_id(user_id)?;
        let record = self.repo.set_available(user_id, is_available, Utc::now()).await?;
        counter!("beacon_availability_changes_total", "available" => is_available.to_string())
            .increment(1);
        Ok(record)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn list_available(&self, limit: i64, offset: i64) -> Result<Page<PresenceRecord>> {
        let (limit, offset) = page_bounds(limit, offset, self.max_page_size)?;
        let (items, total) = self.repo.list_available(limit, offset).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Every available user in listing order
    pub async fn available_records(&self) -> Result<Vec<PresenceRecord>> {
        self.repo.all_available().await
    }

    /// Mark users offline whose last heartbeat is older than the timeout
    #[instrument(level = "debug", skip(self))]
    pub async fn expire_stale(&self) -> Result<u64> {
        let timeout = chrono::Duration::from_std(self.offline_timeout)
            .map_err(|e| DiscoveryError::Config(format!("offline timeout out of range: {e}")))?;
        self.expire_stale_before(Utc::now() - timeout).await
    }

    pub async fn expire_stale_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let expired = self.repo.expire_stale(cutoff).await?;
        if expired > 0 {
            info!("🔕 Marked {} idle users offline", expired);
            counter!("beacon_presence_expired_total").increment(expired);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_db::MemoryPresenceRepository;

    fn service() -> PresenceService {
        service_with_repo().0
    }

    fn service_with_repo() -> (PresenceService, Arc<MemoryPresenceRepository>) {
        let repo = Arc::new(MemoryPresenceRepository::default());
        (PresenceService::new(repo.clone(), &PresenceConfig::default()), repo)
    }

    #[tokio::test]
    async fn test_heartbeat_is_idempotent() {
        let presence = service();
        let first = presence.heartbeat("@alice:beacon.local").await.unwrap();
        let second = presence.heartbeat("@alice:beacon.local").await.unwrap();
        assert!(first.is_available && second.is_available);
        assert!(second.last_available_at >= first.last_available_at);

        let page = presence.list_available(10, 0).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let err = service().get_availability("@ghost:beacon.local").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_toggle_off_keeps_timestamp_toggle_on_stamps() {
        let presence = service();
        let beat = presence.heartbeat("@alice:beacon.local").await.unwrap();
        let off = presence.set_availability("@alice:beacon.local", false).await.unwrap();
        assert!(!off.is_available);
        assert_eq!(off.last_available_at, beat.last_available_at);

        let on = presence.set_availability("@alice:beacon.local", true).await.unwrap();
        assert!(on.is_available);
        assert!(on.last_available_at >= beat.last_available_at);

        let fresh = presence.set_availability("@bob:beacon.local", true).await.unwrap();
        assert!(fresh.is_available);
        assert!(fresh.last_available_at.is_some());
    }

    #[tokio::test]
    async fn test_toggle_on_survives_offline_check() {
        let (presence, repo) = service_with_repo();
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        repo.heartbeat("@alice:beacon.local", two_hours_ago).await.unwrap();
        presence.set_availability("@alice:beacon.local", false).await.unwrap();
        presence.set_availability("@alice:beacon.local", true).await.unwrap();

        assert_eq!(presence.expire_stale().await.unwrap(), 0);
        let alice = presence.get_availability("@alice:beacon.local").await.unwrap();
        assert!(alice.is_available);
    }

    #[tokio::test]
    async fn test_negative_paging_rejected() {
        let presence = service();
        assert!(matches!(
            presence.list_available(-1, 0).await,
            Err(DiscoveryError::Validation(_))
        ));
        assert!(matches!(
            presence.list_available(10, -1).await,
            Err(DiscoveryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_limit_capped_at_page_size() {
        let presence = service();
        for i in 0..3 {
            presence.heartbeat(&format!("@user{i}:beacon.local")).await.unwrap();
        }
        let page = presence.list_available(10_000, 0).await.unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.items.len(), 3);
    }

    #[tokio::test]
    async fn test_expire_stale_marks_idle_users_offline() {
        let (presence, repo) = service_with_repo();
        presence.heartbeat("@alice:beacon.local").await.unwrap();
        repo.heartbeat("@bob:beacon.local", Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();

        assert_eq!(presence.expire_stale().await.unwrap(), 1);
        let bob = presence.get_availability("@bob:beacon.local").await.unwrap();
        assert!(!bob.is_available);

        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(presence.expire_stale_before(later).await.unwrap(), 1);
        let alice = presence.get_availability("@alice:beacon.local").await.unwrap();
        assert!(!alice.is_available);
        assert!(alice.last_available_at.is_some());
    }
}
