//! Core record types shared by the Beacon crates
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Already-authenticated user identifier supplied by the caller
pub type UserId = String;

/// Lower bound of a weight sum that is considered normalized
pub const WEIGHT_SUM_MIN: f64 = 0.95;
/// Upper bound of a weight sum that is considered normalized
pub const WEIGHT_SUM_MAX: f64 = 1.05;

/// Availability of a single user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub is_available: bool,
    /// Last heartbeat; `None` until the user sends the first one
    pub last_available_at: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    /// A fresh record that has never seen a heartbeat
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_available: false,
            last_available_at: None,
        }
    }
}

/// A short, auto-expiring status message. One row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: Uuid,
    pub user_id: UserId,
    pub message: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the row is deactivated by a delete or the expiry sweep
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Broadcast {
    /// `now > expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self, now)
    }

    /// Active and not yet past its deadline
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.deleted_at.is_none() && !self.is_expired(now)
    }
}

/// Pure expiry predicate shared by the sweep and the read paths
pub fn is_expired(broadcast: &Broadcast, now: DateTime<Utc>) -> bool {
    now > broadcast.expires_at
}

/// Weights of the four ranking components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub semantic_similarity: f64,
    pub interest_overlap: f64,
    pub geo_proximity: f64,
    pub recent_activity: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            semantic_similarity: 0.60,
            interest_overlap: 0.20,
            geo_proximity: 0.10,
            recent_activity: 0.10,
        }
    }
}

impl RankingWeights {
    pub fn sum(&self) -> f64 {
        self.semantic_similarity + self.interest_overlap + self.geo_proximity + self.recent_activity
    }

    /// Reports whether the sum lies in `[0.95, 1.05]`. Never rejects.
    pub fn validate(&self) -> WeightValidation {
        let sum = self.sum();
        WeightValidation {
            valid: (WEIGHT_SUM_MIN..=WEIGHT_SUM_MAX).contains(&sum),
            sum,
        }
    }

    /// Overlay the fields present in `update`
    pub fn merged(&self, update: &WeightsUpdate) -> Self {
        Self {
            semantic_similarity: update.semantic_similarity.unwrap_or(self.semantic_similarity),
            interest_overlap: update.interest_overlap.unwrap_or(self.interest_overlap),
            geo_proximity: update.geo_proximity.unwrap_or(self.geo_proximity),
            recent_activity: update.recent_activity.unwrap_or(self.recent_activity),
        }
    }
}

/// Partial update of 1 to 4 weight fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightsUpdate {
    pub semantic_similarity: Option<f64>,
    pub interest_overlap: Option<f64>,
    pub geo_proximity: Option<f64>,
    pub recent_activity: Option<f64>,
}

impl WeightsUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_none())
    }

    pub fn fields(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("semantic_similarity", self.semantic_similarity),
            ("interest_overlap", self.interest_overlap),
            ("geo_proximity", self.geo_proximity),
            ("recent_activity", self.recent_activity),
        ]
    }
}

/// Outcome of a weight-sum check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightValidation {
    pub valid: bool,
    pub sum: f64,
}

/// One page of a listing together with the unpaginated total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}
