//! Beacon Search Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Wraps the external semantic search collaborator. A failed search never
//! fails the discovery request: timeouts, non-2xx statuses, transport errors
//! and malformed bodies all produce the candidates in their input order with
//! `degraded = true` and a human-readable warning.
//!
//! There is exactly one attempt per request, bounded by the caller's
//! timeout. No retries.

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use beacon_common::{config::SearchConfig, UserId};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

pub mod error;
pub mod http;

pub use error::{SearchError, SearchResult};
pub use http::HttpSearchClient;

/// Warning attached when the collaborator failed
pub const DEGRADED_WARNING: &str =
    "Search service temporarily unavailable. Returning unranked results.";
/// Warning attached when search is switched off by configuration
pub const DISABLED_WARNING: &str = "Search is disabled. Returning unranked results.";

/// One scored id as returned by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub user_id: UserId,
    pub score: f64,
}

/// A candidate in adapter output order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub user_id: UserId,
    /// Semantic similarity, absent for candidates the service did not score
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub ranked: Vec<RankedCandidate>,
    pub degraded: bool,
    pub search_enabled: bool,
    pub warnings: Vec<String>,
}

impl SearchOutcome {
    /// Every candidate, input order, unscored
    pub fn passthrough(candidate_ids: &[UserId], search_enabled: bool) -> Self {
        Self {
            ranked: candidate_ids
                .iter()
                .map(|id| RankedCandidate {
                    user_id: id.clone(),
                    score: None,
                })
                .collect(),
            degraded: false,
            search_enabled,
            warnings: Vec::new(),
        }
    }

    /// Unranked fallback carrying `warning`
    pub fn degraded(candidate_ids: &[UserId], search_enabled: bool, warning: &str) -> Self {
        Self {
            degraded: true,
            warnings: vec![warning.to_string()],
            ..Self::passthrough(candidate_ids, search_enabled)
        }
    }
}

/// Raw call to the collaborator; errors are handled by the adapter
#[async_trait]
pub trait SemanticSearchClient: Send + Sync {
    async fn rank(&self, query: &str, candidate_ids: &[UserId]) -> SearchResult<Vec<SearchHit>>;
}

/// Semantic ranking with graceful degradation
#[async_trait]
pub trait SearchFallbackAdapter: Send + Sync + fmt::Debug {
    fn is_enabled(&self) -> bool;

    async fn rank_by_semantic_query(
        &self,
        query: &str,
        candidate_ids: &[UserId],
        timeout: Duration,
    ) -> SearchOutcome;
}

/// Service hits first in service order, then the candidates the service
/// left out in input order. Ids that were not candidates are dropped.
pub fn merge_hits(candidate_ids: &[UserId], hits: Vec<SearchHit>) -> Vec<RankedCandidate> {
    let candidates: HashSet<&str> = candidate_ids.iter().map(String::as_str).collect();
    let mut seen: HashSet<UserId> = HashSet::with_capacity(hits.len());
    let mut ranked = Vec::with_capacity(candidate_ids.len());

    for hit in hits {
        if !candidates.contains(hit.user_id.as_str()) || seen.contains(&hit.user_id) {
            continue;
        }
        seen.insert(hit.user_id.clone());
        let score = hit.score.is_finite().then_some(hit.score);
        ranked.push(RankedCandidate {
            user_id: hit.user_id,
            score,
        });
    }
    for id in candidate_ids {
        if seen.insert(id.clone()) {
            ranked.push(RankedCandidate {
                user_id: id.clone(),
                score: None,
            });
        }
    }
    ranked
}

/// Network-backed adapter: one bounded attempt, fallback on any failure
pub struct FallbackSearchAdapter<C> {
    client: C,
}

impl<C> fmt::Debug for FallbackSearchAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackSearchAdapter").finish_non_exhaustive()
    }
}

impl<C: SemanticSearchClient> FallbackSearchAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    async fn attempt(
        &self,
        query: &str,
        candidate_ids: &[UserId],
        timeout: Duration,
    ) -> SearchResult<Vec<SearchHit>> {
        match tokio::time::timeout(timeout, self.client.rank(query, candidate_ids)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl<C: SemanticSearchClient> SearchFallbackAdapter for FallbackSearchAdapter<C> {
    fn is_enabled(&self) -> bool {
        true
    }

    #[instrument(level = "debug", skip(self, candidate_ids), fields(candidates = candidate_ids.len()))]
    async fn rank_by_semantic_query(
        &self,
        query: &str,
        candidate_ids: &[UserId],
        timeout: Duration,
    ) -> SearchOutcome {
        if query.trim().is_empty() || candidate_ids.is_empty() {
            debug!("🔍 Nothing to rank semantically");
            return SearchOutcome::passthrough(candidate_ids, true);
        }

        match self.attempt(query, candidate_ids, timeout).await {
            Ok(hits) => SearchOutcome {
                ranked: merge_hits(candidate_ids, hits),
                degraded: false,
                search_enabled: true,
                warnings: Vec::new(),
            },
            Err(err) => {
                warn!("⚠️ Semantic search failed, returning unranked results: {}", err);
                counter!("beacon_search_degraded_total", "reason" => err.kind()).increment(1);
                SearchOutcome::degraded(candidate_ids, true, DEGRADED_WARNING)
            }
        }
    }
}

/// Adapter used when search is switched off: always unranked
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSearchAdapter;

#[async_trait]
impl SearchFallbackAdapter for DisabledSearchAdapter {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn rank_by_semantic_query(
        &self,
        _query: &str,
        candidate_ids: &[UserId],
        _timeout: Duration,
    ) -> SearchOutcome {
        SearchOutcome::degraded(candidate_ids, false, DISABLED_WARNING)
    }
}

/// Pick the adapter implementation from configuration
pub fn build_adapter(config: &SearchConfig) -> SearchResult<Arc<dyn SearchFallbackAdapter>> {
    if !config.enabled {
        info!("🔕 Semantic search disabled");
        return Ok(Arc::new(DisabledSearchAdapter));
    }
    let client = HttpSearchClient::new(&config.base_url)?;
    info!("🔍 Semantic search enabled at {}", client.endpoint());
    Ok(Arc::new(FallbackSearchAdapter::new(client)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
        result: fn() -> SearchResult<Vec<SearchHit>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubClient {
        fn new(result: fn() -> SearchResult<Vec<SearchHit>>) -> Self {
            Self {
                result,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SemanticSearchClient for StubClient {
        async fn rank(&self, _query: &str, _ids: &[UserId]) -> SearchResult<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (self.result)()
        }
    }

    fn ids(raw: &[&str]) -> Vec<UserId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn hit(user_id: &str, score: f64) -> SearchHit {
        SearchHit {
            user_id: user_id.to_string(),
            score,
        }
    }

    #[test]
    fn test_merge_hits_orders_and_filters() {
        let candidates = ids(&["@a", "@b", "@c", "@d"]);
        let merged = merge_hits(
            &candidates,
            vec![hit("@c", 0.9), hit("@zz", 0.8), hit("@a", 0.4), hit("@c", 0.1)],
        );
        let order: Vec<_> = merged.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(order, ["@c", "@a", "@b", "@d"]);
        assert_eq!(merged[0].score, Some(0.9));
        assert_eq!(merged[2].score, None);
    }

    #[test(tokio::test)]
    async fn test_failure_degrades_to_passthrough() {
        let adapter = FallbackSearchAdapter::new(StubClient::new(|| Err(SearchError::Status(503))));
        let candidates = ids(&["@c", "@a", "@b"]);

        let outcome = adapter
            .rank_by_semantic_query("hiking", &candidates, Duration::from_secs(1))
            .await;

        assert!(outcome.degraded);
        assert!(outcome.search_enabled);
        assert_eq!(outcome.warnings, vec![DEGRADED_WARNING.to_string()]);
        let order: Vec<_> = outcome.ranked.iter().map(|c| c.user_id.clone()).collect();
        assert_eq!(order, candidates);
        assert!(outcome.ranked.iter().all(|c| c.score.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_treated_as_failure() {
        let mut client = StubClient::new(|| Ok(vec![hit("@a", 1.0)]));
        client.delay = Duration::from_secs(30);
        let adapter = FallbackSearchAdapter::new(client);

        let outcome = adapter
            .rank_by_semantic_query("hiking", &ids(&["@a", "@b"]), Duration::from_secs(10))
            .await;

        assert!(outcome.degraded);
        assert!(!outcome.warnings.is_empty());
        assert_eq!(outcome.ranked.len(), 2);
        assert_eq!(adapter.client.calls.load(Ordering::SeqCst), 1);
    }

    #[test(tokio::test)]
    async fn test_success_ranks_candidates() {
        let adapter = FallbackSearchAdapter::new(StubClient::new(|| Ok(vec![hit("@b", 0.7)])));
        let outcome = adapter
            .rank_by_semantic_query("hiking", &ids(&["@a", "@b"]), Duration::from_secs(1))
            .await;

        assert!(!outcome.degraded);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.ranked[0], RankedCandidate { user_id: "@b".into(), score: Some(0.7) });
        assert_eq!(outcome.ranked[1], RankedCandidate { user_id: "@a".into(), score: None });
    }

    #[test(tokio::test)]
    async fn test_blank_query_skips_collaborator() {
        let adapter = FallbackSearchAdapter::new(StubClient::new(|| Err(SearchError::Status(500))));
        let outcome = adapter
            .rank_by_semantic_query("   ", &ids(&["@a"]), Duration::from_secs(1))
            .await;

        assert!(!outcome.degraded);
        assert_eq!(adapter.client.calls.load(Ordering::SeqCst), 0);
    }

    #[test(tokio::test)]
    async fn test_disabled_adapter_is_always_degraded() {
        let outcome = DisabledSearchAdapter
            .rank_by_semantic_query("hiking", &ids(&["@b", "@a"]), Duration::from_secs(1))
            .await;
        assert!(outcome.degraded);
        assert!(!outcome.search_enabled);
        assert_eq!(outcome.warnings, vec![DISABLED_WARNING.to_string()]);
        assert_eq!(outcome.ranked[0].user_id, "@b");
    }

    #[test]
    fn test_build_adapter_from_config() {
        let disabled = build_adapter(&SearchConfig::default()).unwrap();
        assert!(!disabled.is_enabled());

        let config = SearchConfig {
            enabled: true,
            base_url: "http://search.internal:8090/".to_string(),
            timeout_ms: 500,
        };
        assert!(build_adapter(&config).unwrap().is_enabled());

        let bad = SearchConfig {
            base_url: "search.internal".to_string(),
            ..config
        };
        assert!(matches!(build_adapter(&bad), Err(SearchError::Config(_))));
    }
}
