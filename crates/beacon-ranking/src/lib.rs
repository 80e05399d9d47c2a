//! Beacon Ranking Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Multi-factor relevance ranking between a requester and candidate users:
//! semantic similarity, interest overlap (Jaccard over bitsets), geographic
//! proximity (Haversine with a hard radius) and recent activity
//! (exponential decay with a floor).

pub mod bitset;
pub mod engine;
pub mod geo;

pub use bitset::InterestSet;
pub use engine::{
    rank_order, RankingEngine, RankingInput, RankingResult, RequesterContext, ScoreBreakdown,
};
pub use geo::{haversine_km, GeoPoint};
