//! Ranking weights with a read-through cache
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use std::{sync::Arc, time::Duration};

use beacon_common::{DiscoveryError, RankingWeights, Result, WeightValidation, WeightsUpdate};
use beacon_db::{WeightsRepository, DEFAULT_WEIGHTS_NAME};
use metrics::counter;
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy)]
struct CachedWeights {
    weights: RankingWeights,
    loaded_at: Instant,
}

impl CachedWeights {
    fn new(weights: RankingWeights) -> Self {
        Self {
            weights,
            loaded_at: Instant::now(),
        }
    }
}

/// Weights are served from memory and re-read from storage after `ttl`.
///
/// Storage round-trips (refresh, update, reset) are serialized by `storage`
/// and never run under the cache lock; the cache lock is only taken to copy
/// or swap the snapshot. While a refresh is in flight other readers keep
/// getting the previous snapshot.
pub struct RankingConfigStore {
    repo: Arc<dyn WeightsRepository>,
    name: String,
    ttl: Duration,
    cache: RwLock<Option<CachedWeights>>,
    storage: Mutex<()>,
}

impl std::fmt::Debug for RankingConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingConfigStore")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RankingConfigStore {
    pub fn new(repo: Arc<dyn WeightsRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            name: DEFAULT_WEIGHTS_NAME.to_string(),
            ttl,
            cache: RwLock::new(None),
            storage: Mutex::new(()),
        }
    }

    async fn snapshot(&self) -> Option<CachedWeights> {
        *self.cache.read().await
    }

    async fn swap(&self, weights: RankingWeights) {
        *self.cache.write().await = Some(CachedWeights::new(weights));
    }

    /// Current weights, from cache while it is fresh
    #[instrument(level = "debug", skip(self))]
    pub async fn get_weights(&self) -> Result<RankingWeights> {
        match self.snapshot().await {
            Some(cached) if cached.loaded_at.elapsed() < self.ttl => Ok(cached.weights),
            Some(stale) => {
                // someone else is talking to storage; the old snapshot will do
                let Ok(_guard) = self.storage.try_lock() else {
                    return Ok(stale.weights);
                };
                match self.load_or_seed().await {
                    Ok(weights) => {
                        self.swap(weights).await;
                        debug!("🔄 Ranking weights refreshed from storage");
                        Ok(weights)
                    }
                    Err(e) => {
                        warn!("⚠️ Weights refresh failed, serving cached values: {}", e);
                        Ok(stale.weights)
                    }
                }
            }
            None => {
                let _guard = self.storage.lock().await;
                // a writer or another reader may have filled it while we waited
                if let Some(cached) = self.snapshot().await {
                    return Ok(cached.weights);
                }
                let weights = self.load_or_seed().await?;
                self.swap(weights).await;
                debug!("🔄 Ranking weights loaded from storage");
                Ok(weights)
            }
        }
    }

    async fn load_or_seed(&self) -> Result<RankingWeights> {
        match self.repo.load(&self.name).await? {
            Some(weights) => Ok(weights),
            None => {
                let defaults = RankingWeights::default();
                self.repo.store(&self.name, &defaults).await?;
                info!("🔧 Seeded default ranking weights");
                Ok(defaults)
            }
        }
    }

    /// Merge the given fields into the stored weights.
    ///
    /// Each value must be finite and non-negative. A sum outside
    /// `[0.95, 1.05]` is logged and counted but still stored.
    #[instrument(level = "debug", skip(self))]
    pub async fn update_weights(&self, update: WeightsUpdate) -> Result<RankingWeights> {
        if update.is_empty() {
            return Err(DiscoveryError::validation("at least one weight must be provided"));
        }
        for (field, value) in update.fields() {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(DiscoveryError::validation(format!(
                        "{field} must be a non-negative number, got {value}"
                    )));
                }
            }
        }

        let _guard = self.storage.lock().await;
        let current = self.load_or_seed().await?;
        let merged = current.merged(&update);
        self.audit(&merged);
        self.repo.store(&self.name, &merged).await?;
        self.swap(merged).await;

        info!("✅ Ranking weights updated: {:?}", merged);
        Ok(merged)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn reset_to_defaults(&self) -> Result<RankingWeights> {
        let defaults = RankingWeights::default();
        let _guard = self.storage.lock().await;
        self.repo.store(&self.name, &defaults).await?;
        self.swap(defaults).await;
        info!("✅ Ranking weights reset to defaults");
        Ok(defaults)
    }

    pub fn validate_weights(&self, weights: &RankingWeights) -> WeightValidation {
        weights.validate()
    }

    /// Drop the cache; the next read goes to storage
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    fn audit(&self, weights: &RankingWeights) {
        let validation = weights.validate();
        if !validation.valid {
            warn!(
                "⚠️ Ranking weights sum to {:.3}, outside [0.95, 1.05]; scores will not be normalized",
                validation.sum
            );
            counter!("beacon_ranking_weights_out_of_range_total").increment(1);
        }
    }
}
