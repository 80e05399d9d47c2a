//! In-memory repositories
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! One `RwLock` per table: a write holds the lock for the duration of a
//! single-row change, which gives the same atomicity as a one-statement
//! upsert in the postgres backend.

use std::{cmp::Ordering, collections::HashMap};

use async_trait::async_trait;
use beacon_common::{Broadcast, PresenceRecord, RankingWeights, Result, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{BroadcastRepository, PresenceRepository, WeightsRepository};

/// Listing order: most recent heartbeat first, never-seen last, then user id
pub(crate) fn listing_order(a: &PresenceRecord, b: &PresenceRecord) -> Ordering {
    match (a.last_available_at, b.last_available_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.user_id.cmp(&b.user_id))
}

#[derive(Debug, Default)]
pub struct MemoryPresenceRepository {
    rows: RwLock<HashMap<UserId, PresenceRecord>>,
}

impl MemoryPresenceRepository {
    async fn sorted_available(&self) -> Vec<PresenceRecord> {
        let rows = self.rows.read().await;
        let mut available: Vec<PresenceRecord> =
            rows.values().filter(|r| r.is_available).cloned().collect();
        available.sort_by(listing_order);
        available
    }
}

#[async_trait]
impl PresenceRepository for MemoryPresenceRepository {
    async fn get(&self, user_id: &str) -> Result<Option<PresenceRecord>> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn set_available(
        &self,
        user_id: &str,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<PresenceRecord> {
        let mut rows = self.rows.write().await;
        let record = rows
            .entry(user_id.to_owned())
            .or_insert_with(|| PresenceRecord::new(user_id));
        record.is_available = is_available;
        // going offline keeps the last time the user was available
        if is_available {
            record.last_available_at = Some(now);
        }
        Ok(record.clone())
    }

    async fn heartbeat(&self, user_id: &str, now: DateTime<Utc>) -> Result<PresenceRecord> {
        let mut rows = self.rows.write().await;
        let record = rows
            .entry(user_id.to_owned())
            .or_insert_with(|| PresenceRecord::new(user_id));
        record.is_available = true;
        record.last_available_at = Some(now);
        Ok(record.clone())
    }

    async fn list_available(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<PresenceRecord>, u64)> {
        let available = self.sorted_available().await;
        let total = available.len() as u64;
        let page = available.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn all_available(&self) -> Result<Vec<PresenceRecord>> {
        Ok(self.sorted_available().await)
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for record in rows.values_mut() {
            let stale = record.last_available_at.map_or(true, |seen| seen < cutoff);
            if record.is_available && stale {
                record.is_available = false;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryBroadcastRepository {
    rows: RwLock<HashMap<UserId, Broadcast>>,
}

impl MemoryBroadcastRepository {
    /// Number of stored rows, active or not
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl BroadcastRepository for MemoryBroadcastRepository {
    async fn get(&self, user_id: &str) -> Result<Option<Broadcast>> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, broadcast: Broadcast) -> Result<Broadcast> {
        let mut rows = self.rows.write().await;
        rows.insert(broadcast.user_id.clone(), broadcast.clone());
        Ok(broadcast)
    }

    async fn update_active(
        &self,
        user_id: &str,
        message: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Broadcast>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(user_id).filter(|row| row.is_visible(now)) else {
            return Ok(None);
        };
        row.message = message.to_owned();
        if let Some(expires_at) = expires_at {
            row.expires_at = expires_at;
        }
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn deactivate(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(user_id) {
            Some(row) if row.is_active => {
                row.is_active = false;
                row.deleted_at = Some(now);
                row.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_active_for_users(
        &self,
        user_ids: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<HashMap<UserId, Broadcast>> {
        let rows = self.rows.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|row| row.is_visible(now))
            .map(|row| (row.user_id.clone(), row.clone()))
            .collect())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for row in rows.values_mut().filter(|row| row.is_active && row.is_expired(now)) {
            row.is_active = false;
            row.deleted_at = Some(now);
            row.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| {
            let inactive_since = row.deleted_at.unwrap_or(row.updated_at);
            row.is_active || inactive_since >= cutoff
        });
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryWeightsRepository {
    rows: RwLock<HashMap<String, RankingWeights>>,
}

#[async_trait]
impl WeightsRepository for MemoryWeightsRepository {
    async fn load(&self, name: &str) -> Result<Option<RankingWeights>> {
        Ok(self.rows.read().await.get(name).copied())
    }

    async fn store(&self, name: &str, weights: &RankingWeights) -> Result<()> {
        self.rows.write().await.insert(name.to_owned(), *weights);
        Ok(())
    }
}
