//! Profile hydration for ranking
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use std::collections::HashMap;

use async_trait::async_trait;
use beacon_common::{Result, UserId};
use beacon_ranking::{GeoPoint, InterestSet};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Ranking-relevant slice of a user profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub interests: InterestSet,
    pub location: Option<GeoPoint>,
}

/// Source of interests and locations. Lookups are batched; users without a
/// profile are simply missing from the map.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn profiles(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>>;
}

/// Profiles held in memory, used by the CLI and tests
#[derive(Debug, Default)]
pub struct StaticProfileProvider {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl StaticProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = (UserId, UserProfile)>) -> Self {
        Self {
            profiles: RwLock::new(profiles.into_iter().collect()),
        }
    }

    pub async fn insert(&self, user_id: impl Into<UserId>, profile: UserProfile) {
        self.profiles.write().await.insert(user_id.into(), profile);
    }
}

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn profiles(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::block_on;

    #[test]
    fn test_missing_profiles_are_skipped() {
        let provider = StaticProfileProvider::with_profiles([(
            "@alice:beacon.local".to_string(),
            UserProfile {
                interests: [1usize, 4].into_iter().collect(),
                location: Some(GeoPoint::new(37.7749, -122.4194)),
            },
        )]);
        block_on(provider.insert("@bob:beacon.local", UserProfile::default()));

        let ids = vec![
            "@alice:beacon.local".to_string(),
            "@bob:beacon.local".to_string(),
            "@carol:beacon.local".to_string(),
        ];
        let found = block_on(provider.profiles(&ids)).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found["@alice:beacon.local"].interests.contains(4));
        assert!(!found.contains_key("@carol:beacon.local"));
    }
}
