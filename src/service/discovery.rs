//! Discovery orchestration
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Search pipeline: available users, minus the requester, go through the
//! semantic adapter, get hydrated with profile data, scored against one
//! weights snapshot, paginated, and decorated with active broadcasts.

use std::{collections::HashMap, sync::Arc, time::Duration};

use beacon_common::{
    BeaconConfig, Broadcast, DiscoveryError, Page, PresenceRecord, RankingWeights, Result,
    UserId, WeightValidation, WeightsUpdate,
};
use beacon_db::Repositories;
use beacon_ranking::{
    GeoPoint, InterestSet, RankingEngine, RankingInput, RankingResult, RequesterContext,
    ScoreBreakdown,
};
use beacon_search::{build_adapter, SearchFallbackAdapter, SearchOutcome};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::{
    ensure_user_id, page_bounds, BroadcastService, PresenceService, ProfileProvider,
    RankingConfigStore,
};

/// One ranked user in a search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub user_id: UserId,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub last_available_at: Option<DateTime<Utc>>,
    pub broadcast: Option<Broadcast>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Candidates considered before pagination
    pub total_candidates: u64,
    pub limit: usize,
    pub offset: usize,
    pub search_enabled: bool,
    pub degraded: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub metadata: SearchMetadata,
}

/// Facade over presence, broadcasts, weights, ranking and search
pub struct DiscoveryService {
    presence: PresenceService,
    broadcasts: BroadcastService,
    weights: RankingConfigStore,
    engine: RankingEngine,
    search: Arc<dyn SearchFallbackAdapter>,
    profiles: Arc<dyn ProfileProvider>,
    search_timeout: Duration,
    parallel_threshold: usize,
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("presence", &self.presence)
            .field("broadcasts", &self.broadcasts)
            .field("weights", &self.weights)
            .field("engine", &self.engine)
            .field("search", &self.search)
            .field("search_timeout", &self.search_timeout)
            .finish_non_exhaustive()
    }
}

impl DiscoveryService {
    pub fn new(
        config: &BeaconConfig,
        repos: Repositories,
        search: Arc<dyn SearchFallbackAdapter>,
        profiles: Arc<dyn ProfileProvider>,
    ) -> Self {
        Self {
            presence: PresenceService::new(repos.presence, &config.presence),
            broadcasts: BroadcastService::new(repos.broadcasts, config.broadcast.clone()),
            weights: RankingConfigStore::new(
                repos.weights,
                Duration::from_secs(config.ranking.cache_ttl_s),
            ),
            engine: RankingEngine::new(config.ranking.max_radius_km, config.ranking.parallel_threshold),
            search,
            profiles,
            search_timeout: config.search.timeout(),
            parallel_threshold: config.ranking.parallel_threshold,
        }
    }

    /// Build with the search adapter the configuration asks for
    pub fn from_config(
        config: &BeaconConfig,
        repos: Repositories,
        profiles: Arc<dyn ProfileProvider>,
    ) -> Result<Self> {
        let search = build_adapter(&config.search)
            .map_err(|e| DiscoveryError::Config(format!("search adapter: {e}")))?;
        info!("✅ Discovery service ready (search enabled: {})", search.is_enabled());
        Ok(Self::new(config, repos, search, profiles))
    }

    pub fn presence(&self) -> &PresenceService {
        &self.presence
    }

    pub fn broadcasts(&self) -> &BroadcastService {
        &self.broadcasts
    }

    pub fn ranking_config(&self) -> &RankingConfigStore {
        &self.weights
    }

    // Presence

    pub async fn heartbeat(&self, user_id: &str) -> Result<PresenceRecord> {
        self.presence.heartbeat(user_id).await
    }

    pub async fn get_availability(&self, user_id: &str) -> Result<PresenceRecord> {
        self.presence.get_availability(user_id).await
    }

    pub async fn set_availability(&self, user_id: &str, is_available: bool) -> Result<PresenceRecord> {
        self.presence.set_availability(user_id, is_available).await
    }

    pub async fn list_available(&self, limit: i64, offset: i64) -> Result<Page<PresenceRecord>> {
        self.presence.list_available(limit, offset).await
    }

    // Broadcasts

    pub async fn create_broadcast(&self, user_id: &str, message: &str, ttl_hours: Option<i64>) -> Result<Broadcast> {
        self.broadcasts.create(user_id, message, ttl_hours).await
    }

    pub async fn update_broadcast(&self, user_id: &str, message: &str, ttl_hours: Option<i64>) -> Result<Broadcast> {
        self.broadcasts.update(user_id, message, ttl_hours).await
    }

    pub async fn delete_broadcast(&self, user_id: &str) -> Result<()> {
        self.broadcasts.delete(user_id).await
    }

    pub async fn get_broadcast(&self, user_id: &str) -> Result<Broadcast> {
        self.broadcasts.get_active(user_id).await
    }

    // Ranking weights

    pub async fn get_ranking_weights(&self) -> Result<RankingWeights> {
        self.weights.get_weights().await
    }

    pub async fn update_ranking_weights(&self, update: WeightsUpdate) -> Result<RankingWeights> {
        self.weights.update_weights(update).await
    }

    pub async fn reset_ranking_weights(&self) -> Result<RankingWeights> {
        self.weights.reset_to_defaults().await
    }

    pub fn validate_ranking_weights(&self, weights: &RankingWeights) -> WeightValidation {
        self.weights.validate_weights(weights)
    }

    /// Rank available users for `requester_id`, optionally guided by a
    /// free-text query.
    #[instrument(level = "debug", skip(self, query), fields(requester = %requester_id))]
    pub async fn search_available(
        &self,
        requester_id: &str,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchResponse> {
        ensure_user_id(requester_id)?;
        let (limit, offset) = page_bounds(limit, offset, self.presence.max_page_size())?;
        let start = Instant::now();

        let records: Vec<PresenceRecord> = self
            .presence
            .available_records()
            .await?
            .into_iter()
            .filter(|record| record.user_id != requester_id)
            .collect();
        let candidate_ids: Vec<UserId> = records.iter().map(|r| r.user_id.clone()).collect();
        let last_seen: HashMap<&str, Option<DateTime<Utc>>> = records
            .iter()
            .map(|r| (r.user_id.as_str(), r.last_available_at))
            .collect();

        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let outcome = match query {
            Some(query) => {
                self.search
                    .rank_by_semantic_query(query, &candidate_ids, self.search_timeout)
                    .await
            }
            None => SearchOutcome::passthrough(&candidate_ids, self.search.is_enabled()),
        };

        let mut profiles = self.profiles.profiles(&candidate_ids).await?;
        let requester = self
            .profiles
            .profiles(&[requester_id.to_owned()])
            .await?
            .remove(requester_id)
            .unwrap_or_default();

        let inputs: Vec<RankingInput> = outcome
            .ranked
            .iter()
            .map(|candidate| {
                let profile = profiles.remove(&candidate.user_id).unwrap_or_default();
                RankingInput {
                    user_id: candidate.user_id.clone(),
                    semantic_similarity: candidate.score,
                    interests: profile.interests,
                    location: profile.location,
                    last_available_at: last_seen.get(candidate.user_id.as_str()).copied().flatten(),
                }
            })
            .collect();

        let weights = self.weights.get_weights().await?;
        let scored = self
            .score_candidates(inputs, requester.interests, requester.location, weights)
            .await?;

        let total_candidates = scored.len() as u64;
        let page: Vec<RankingResult> = scored.into_iter().skip(offset).take(limit).collect();
        let page_ids: Vec<UserId> = page.iter().map(|r| r.user_id.clone()).collect();
        let mut broadcasts = self.broadcasts.get_active_for_users(&page_ids).await?;

        let results = page
            .into_iter()
            .map(|result| SearchResultItem {
                last_available_at: last_seen.get(result.user_id.as_str()).copied().flatten(),
                broadcast: broadcasts.remove(&result.user_id),
                user_id: result.user_id,
                score: result.score,
                breakdown: result.breakdown,
            })
            .collect::<Vec<_>>();

        counter!("beacon_searches_total", "degraded" => outcome.degraded.to_string()).increment(1);
        histogram!("beacon_search_seconds").record(start.elapsed().as_secs_f64());
        debug!(
            "🔍 Search for {} returned {} of {} candidates in {:?}",
            requester_id,
            results.len(),
            total_candidates,
            start.elapsed()
        );

        Ok(SearchResponse {
            results,
            metadata: SearchMetadata {
                total_candidates,
                limit,
                offset,
                search_enabled: outcome.search_enabled,
                degraded: outcome.degraded,
                warnings: outcome.warnings,
            },
        })
    }

    /// Score on the runtime for small batches, on a blocking thread (which
    /// fans out to the engine's worker threads) for large ones
    async fn score_candidates(
        &self,
        inputs: Vec<RankingInput>,
        interests: InterestSet,
        location: Option<GeoPoint>,
        weights: RankingWeights,
    ) -> Result<Vec<RankingResult>> {
        let now = Utc::now();
        if inputs.len() <= self.parallel_threshold {
            let requester = RequesterContext {
                interests: &interests,
                location,
            };
            return Ok(self.engine.batch_score(&inputs, requester, &weights, now));
        }

        let engine = self.engine.clone();
        let scored = tokio::task::spawn_blocking(move || {
            let requester = RequesterContext {
                interests: &interests,
                location,
            };
            engine.batch_score(&inputs, requester, &weights, now)
        })
        .await?;
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{StaticProfileProvider, UserProfile};
    use beacon_search::{DisabledSearchAdapter, DISABLED_WARNING};

    fn service(profiles: StaticProfileProvider) -> DiscoveryService {
        DiscoveryService::new(
            &BeaconConfig::default(),
            Repositories::in_memory(),
            Arc::new(DisabledSearchAdapter),
            Arc::new(profiles),
        )
    }

    #[tokio::test]
    async fn test_requester_is_excluded() {
        let discovery = service(StaticProfileProvider::new());
        discovery.heartbeat("@alice:beacon.local").await.unwrap();
        discovery.heartbeat("@bob:beacon.local").await.unwrap();

        let response = discovery
            .search_available("@alice:beacon.local", None, 20, 0)
            .await
            .unwrap();
        assert_eq!(response.metadata.total_candidates, 1);
        assert_eq!(response.results[0].user_id, "@bob:beacon.local");
        assert!(!response.metadata.search_enabled);
        assert!(!response.metadata.degraded);
    }

    #[tokio::test]
    async fn test_disabled_search_reports_warning() {
        let discovery = service(StaticProfileProvider::new());
        discovery.heartbeat("@bob:beacon.local").await.unwrap();

        let response = discovery
            .search_available("@alice:beacon.local", Some("hiking"), 20, 0)
            .await
            .unwrap();
        assert!(response.metadata.degraded);
        assert_eq!(response.metadata.warnings, vec![DISABLED_WARNING.to_string()]);
        assert_eq!(response.results.len(), 1);
    }

    #[tokio::test]
    async fn test_interest_overlap_drives_order() {
        let hikers: InterestSet = [1usize, 2, 3].into_iter().collect();
        let profiles = StaticProfileProvider::with_profiles([
            (
                "@alice:beacon.local".to_string(),
                UserProfile {
                    interests: hikers.clone(),
                    location: None,
                },
            ),
            (
                "@bob:beacon.local".to_string(),
                UserProfile {
                    interests: [7usize].into_iter().collect(),
                    location: None,
                },
            ),
            (
                "@carol:beacon.local".to_string(),
                UserProfile {
                    interests: hikers,
                    location: None,
                },
            ),
        ]);
        let discovery = service(profiles);
        discovery.heartbeat("@carol:beacon.local").await.unwrap();
        discovery.heartbeat("@bob:beacon.local").await.unwrap();

        let response = discovery
            .search_available("@alice:beacon.local", None, 20, 0)
            .await
            .unwrap();
        let order: Vec<_> = response.results.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(order, ["@carol:beacon.local", "@bob:beacon.local"]);
        assert_eq!(response.results[0].breakdown.interest_overlap, 1.0);
        assert_eq!(response.results[1].breakdown.interest_overlap, 0.0);
    }

    #[tokio::test]
    async fn test_pagination_and_broadcasts() {
        let discovery = service(StaticProfileProvider::new());
        for name in ["a", "b", "c", "d"] {
            discovery.heartbeat(&format!("@{name}:beacon.local")).await.unwrap();
        }
        discovery
            .create_broadcast("@c:beacon.local", "lunch at noon", None)
            .await
            .unwrap();

        let response = discovery
            .search_available("@requester:beacon.local", None, 2, 1)
            .await
            .unwrap();
        assert_eq!(response.metadata.total_candidates, 4);
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.metadata.limit, 2);
        assert_eq!(response.metadata.offset, 1);

        let all = discovery
            .search_available("@requester:beacon.local", None, 10, 0)
            .await
            .unwrap();
        let with_broadcast: Vec<_> = all
            .results
            .iter()
            .filter_map(|r| r.broadcast.as_ref().map(|b| b.user_id.as_str()))
            .collect();
        assert_eq!(with_broadcast, ["@c:beacon.local"]);
    }

    #[tokio::test]
    async fn test_invalid_paging_is_rejected() {
        let discovery = service(StaticProfileProvider::new());
        assert!(matches!(
            discovery.search_available("@alice:beacon.local", None, -1, 0).await,
            Err(DiscoveryError::Validation(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_large_batch_scored_off_runtime() {
        let mut config = BeaconConfig::default();
        config.ranking.parallel_threshold = 8;
        let discovery = DiscoveryService::new(
            &config,
            Repositories::in_memory(),
            Arc::new(DisabledSearchAdapter),
            Arc::new(StaticProfileProvider::new()),
        );
        for i in 0..40 {
            discovery.heartbeat(&format!("@user{i:02}:beacon.local")).await.unwrap();
        }
        let response = discovery
            .search_available("@requester:beacon.local", None, 100, 0)
            .await
            .unwrap();
        assert_eq!(response.results.len(), 40);
        assert!(response
            .results
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
    }
}
