//! End-to-end discovery tests over the in-memory backend
//!
//! These tests drive `DiscoveryService` the way a request handler would:
//! heartbeats in, ranked search results out.

use std::sync::Arc;

use beacon::{
    BeaconConfig, DiscoveryError, DiscoveryService, GeoPoint, InterestSet, RankingWeights,
    Repositories, StaticProfileProvider, UserProfile, WeightsUpdate,
};
use beacon_search::{
    DisabledSearchAdapter, FallbackSearchAdapter, HttpSearchClient, DEGRADED_WARNING,
};
use serde_json::json;
use test_log::test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SAN_FRANCISCO: GeoPoint = GeoPoint::new(37.7749, -122.4194);
const LOS_ANGELES: GeoPoint = GeoPoint::new(34.0522, -118.2437);

fn interests(ids: &[usize]) -> InterestSet {
    ids.iter().copied().collect()
}

fn profile(ids: &[usize], location: Option<GeoPoint>) -> UserProfile {
    UserProfile {
        interests: interests(ids),
        location,
    }
}

fn profiles() -> StaticProfileProvider {
    StaticProfileProvider::with_profiles([
        ("@alice:beacon.local".to_string(), profile(&[3, 8, 21], Some(SAN_FRANCISCO))),
        ("@bob:beacon.local".to_string(), profile(&[3, 8, 21], Some(SAN_FRANCISCO))),
        ("@carol:beacon.local".to_string(), profile(&[40], Some(LOS_ANGELES))),
    ])
}

fn discovery_with(search: Arc<dyn beacon::SearchFallbackAdapter>) -> DiscoveryService {
    DiscoveryService::new(
        &BeaconConfig::default(),
        Repositories::in_memory(),
        search,
        Arc::new(profiles()),
    )
}

#[test(tokio::test)]
async fn test_same_city_shared_interests_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "user_id": "@bob:beacon.local", "score": 0.85 },
                { "user_id": "@carol:beacon.local", "score": 0.10 }
            ]
        })))
        .mount(&server)
        .await;

    let search = FallbackSearchAdapter::new(HttpSearchClient::new(&server.uri()).unwrap());
    let discovery = discovery_with(Arc::new(search));
    discovery.heartbeat("@alice:beacon.local").await.unwrap();
    discovery.heartbeat("@bob:beacon.local").await.unwrap();
    discovery.heartbeat("@carol:beacon.local").await.unwrap();

    let response = discovery
        .search_available("@alice:beacon.local", Some("climbing partners"), 20, 0)
        .await
        .unwrap();

    assert!(!response.metadata.degraded);
    assert!(response.metadata.search_enabled);
    assert_eq!(response.metadata.total_candidates, 2);

    let bob = &response.results[0];
    assert_eq!(bob.user_id, "@bob:beacon.local");
    assert_eq!(bob.breakdown.semantic_similarity, 0.85);
    assert_eq!(bob.breakdown.interest_overlap, 1.0);
    assert_eq!(bob.breakdown.geo_proximity, 1.0);
    // 0.6 * 0.85 + 0.2 + 0.1 + 0.1 * (almost 1)
    assert!(bob.score > 0.90 && bob.score < 0.911, "got {}", bob.score);

    let carol = &response.results[1];
    assert_eq!(carol.breakdown.geo_proximity, 0.0);
    assert_eq!(carol.breakdown.interest_overlap, 0.0);
}

#[test(tokio::test)]
async fn test_search_outage_degrades_gracefully() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let search = FallbackSearchAdapter::new(HttpSearchClient::new(&server.uri()).unwrap());
    let discovery = discovery_with(Arc::new(search));
    discovery.heartbeat("@bob:beacon.local").await.unwrap();
    discovery.heartbeat("@carol:beacon.local").await.unwrap();

    let response = discovery
        .search_available("@alice:beacon.local", Some("anything"), 20, 0)
        .await
        .unwrap();

    assert!(response.metadata.degraded);
    assert_eq!(response.metadata.warnings, vec![DEGRADED_WARNING.to_string()]);
    assert_eq!(response.results.len(), 2);
    assert!(response
        .results
        .iter()
        .all(|r| r.breakdown.semantic_similarity == 0.0));
    // still ranked on the remaining factors
    assert_eq!(response.results[0].user_id, "@bob:beacon.local");
}

#[test(tokio::test)]
async fn test_blank_query_skips_search_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let search = FallbackSearchAdapter::new(HttpSearchClient::new(&server.uri()).unwrap());
    let discovery = discovery_with(Arc::new(search));
    discovery.heartbeat("@bob:beacon.local").await.unwrap();

    let response = discovery
        .search_available("@alice:beacon.local", Some("   "), 20, 0)
        .await
        .unwrap();
    assert!(!response.metadata.degraded);
    assert!(response.metadata.warnings.is_empty());
    assert_eq!(response.results.len(), 1);
}

#[test(tokio::test)]
async fn test_offline_users_are_not_candidates() {
    let discovery = discovery_with(Arc::new(DisabledSearchAdapter));
    discovery.heartbeat("@bob:beacon.local").await.unwrap();
    discovery.heartbeat("@carol:beacon.local").await.unwrap();
    discovery.set_availability("@carol:beacon.local", false).await.unwrap();

    let listed = discovery.list_available(20, 0).await.unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].user_id, "@bob:beacon.local");

    let response = discovery
        .search_available("@alice:beacon.local", None, 20, 0)
        .await
        .unwrap();
    let ids: Vec<_> = response.results.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(ids, ["@bob:beacon.local"]);
}

#[test(tokio::test)]
async fn test_weight_changes_apply_to_next_search() {
    let discovery = discovery_with(Arc::new(DisabledSearchAdapter));
    discovery.heartbeat("@bob:beacon.local").await.unwrap();
    discovery.heartbeat("@carol:beacon.local").await.unwrap();

    let weights = discovery
        .update_ranking_weights(WeightsUpdate {
            semantic_similarity: Some(0.0),
            interest_overlap: Some(0.0),
            geo_proximity: Some(1.0),
            recent_activity: Some(0.0),
        })
        .await
        .unwrap();
    assert!(discovery.validate_ranking_weights(&weights).valid);

    let response = discovery
        .search_available("@alice:beacon.local", None, 20, 0)
        .await
        .unwrap();
    assert_eq!(response.results[0].user_id, "@bob:beacon.local");
    assert_eq!(response.results[0].score, 1.0);
    assert_eq!(response.results[1].score, 0.0);

    assert_eq!(
        discovery.reset_ranking_weights().await.unwrap(),
        RankingWeights::default()
    );
    assert_eq!(
        discovery.get_ranking_weights().await.unwrap(),
        RankingWeights::default()
    );
}

#[test(tokio::test)]
async fn test_empty_weight_update_is_rejected() {
    let discovery = discovery_with(Arc::new(DisabledSearchAdapter));
    let err = discovery
        .update_ranking_weights(WeightsUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Validation(_)));
}
