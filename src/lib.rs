//! Beacon discovery core
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Presence tracking, relevance ranking and ephemeral broadcasts for user
//! discovery. Callers hand in already authenticated user ids and get plain
//! data back; transport and identity live elsewhere.

pub mod scheduler;
pub mod service;

pub use beacon_common::{
    config::BeaconConfig, Broadcast, DiscoveryError, Page, PresenceRecord, RankingWeights,
    Result, UserId, WeightValidation, WeightsUpdate,
};
pub use beacon_db::Repositories;
pub use beacon_ranking::{GeoPoint, InterestSet, RankingEngine, ScoreBreakdown};
pub use beacon_search::{SearchFallbackAdapter, SearchOutcome};
pub use scheduler::{run_once, MaintenanceReport, MaintenanceSchedule, MaintenanceScheduler};
pub use service::{
    DiscoveryService, ProfileProvider, SearchMetadata, SearchResponse, SearchResultItem,
    StaticProfileProvider, UserProfile,
};
