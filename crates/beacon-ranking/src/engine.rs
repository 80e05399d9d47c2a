//! Composite relevance scoring
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! The engine is a pure transform: inputs plus one weights snapshot in,
//! scored and ordered results out. It never touches storage.

use std::{cmp::Ordering, time::Instant};

use beacon_common::{RankingWeights, UserId};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    bitset::InterestSet,
    geo::{self, GeoPoint, DEFAULT_MAX_RADIUS_KM},
};

/// Time constant of the activity decay, in minutes
pub const RECENCY_TIME_CONSTANT_MIN: f64 = 60.0;
/// Lowest score a candidate with any recorded activity can get
pub const RECENCY_FLOOR: f64 = 0.01;
/// Smallest slice handed to one worker
const CHUNK_SIZE: usize = 64;

/// Per-candidate inputs, hydrated by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingInput {
    pub user_id: UserId,
    /// Externally computed cosine similarity
    pub semantic_similarity: Option<f64>,
    pub interests: InterestSet,
    pub location: Option<GeoPoint>,
    pub last_available_at: Option<DateTime<Utc>>,
}

/// The four sub-scores, each in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic_similarity: f64,
    pub interest_overlap: f64,
    pub geo_proximity: f64,
    pub recent_activity: f64,
}

impl ScoreBreakdown {
    /// Raw weighted sum. No renormalization, even for unnormalized weights.
    pub fn weighted(&self, w: &RankingWeights) -> f64 {
        w.semantic_similarity * self.semantic_similarity
            + w.interest_overlap * self.interest_overlap
            + w.geo_proximity * self.geo_proximity
            + w.recent_activity * self.recent_activity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub user_id: UserId,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// What the requester brings to every comparison in a batch
#[derive(Debug, Clone, Copy)]
pub struct RequesterContext<'a> {
    pub interests: &'a InterestSet,
    pub location: Option<GeoPoint>,
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Pass-through of the external similarity; absent counts as 0
pub fn semantic_score(similarity: Option<f64>) -> f64 {
    similarity.map_or(0.0, clamp_unit)
}

/// Jaccard coefficient of the two interest sets
pub fn interest_overlap(a: &InterestSet, b: &InterestSet) -> f64 {
    clamp_unit(a.jaccard(b))
}

/// `max(0.01, e^(-minutes / 60))`
pub fn recent_activity(minutes: f64) -> f64 {
    let minutes = if minutes.is_nan() { f64::INFINITY } else { minutes.max(0.0) };
    (-minutes / RECENCY_TIME_CONSTANT_MIN).exp().max(RECENCY_FLOOR)
}

/// Recency score of a heartbeat timestamp; 0 when there is none.
/// Timestamps in the future count as "just now".
pub fn recency_score(last_available_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_available_at {
        None => 0.0,
        Some(seen) => {
            let minutes = (now - seen).num_milliseconds() as f64 / 60_000.0;
            recent_activity(minutes)
        }
    }
}

/// Scores candidates against a requester
#[derive(Debug, Clone)]
pub struct RankingEngine {
    max_radius_km: f64,
    parallel_threshold: usize,
    workers: usize,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self {
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            parallel_threshold: 256,
            workers: num_cpus::get(),
        }
    }
}

impl RankingEngine {
    pub fn new(max_radius_km: f64, parallel_threshold: usize) -> Self {
        Self {
            max_radius_km,
            parallel_threshold: parallel_threshold.max(1),
            workers: num_cpus::get(),
        }
    }

    pub fn max_radius_km(&self) -> f64 {
        self.max_radius_km
    }

    pub fn breakdown(
        &self,
        input: &RankingInput,
        requester: RequesterContext<'_>,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        ScoreBreakdown {
            semantic_similarity: semantic_score(input.semantic_similarity),
            interest_overlap: interest_overlap(&input.interests, requester.interests),
            geo_proximity: geo::proximity(input.location, requester.location, self.max_radius_km),
            recent_activity: recency_score(input.last_available_at, now),
        }
    }

    /// Score a single candidate
    pub fn score(
        &self,
        input: &RankingInput,
        requester: RequesterContext<'_>,
        weights: &RankingWeights,
        now: DateTime<Utc>,
    ) -> RankingResult {
        let breakdown = self.breakdown(input, requester, now);
        RankingResult {
            user_id: input.user_id.clone(),
            score: breakdown.weighted(weights),
            breakdown,
        }
    }

    /// Score a batch against one weights snapshot, best first, ties by
    /// user id ascending. Large batches are split into contiguous slices,
    /// one scoped thread per CPU at most, each at least `CHUNK_SIZE` long.
    #[instrument(level = "debug", skip_all, fields(candidates = inputs.len()))]
    pub fn batch_score(
        &self,
        inputs: &[RankingInput],
        requester: RequesterContext<'_>,
        weights: &RankingWeights,
        now: DateTime<Utc>,
    ) -> Vec<RankingResult> {
        let start = Instant::now();

        let mut results: Vec<RankingResult> = if inputs.len() > self.parallel_threshold {
            counter!("beacon_ranking_parallel_batches_total").increment(1);
            let chunk_len = inputs.len().div_ceil(self.workers.max(1)).max(CHUNK_SIZE);
            std::thread::scope(|scope| {
                let handles: Vec<_> = inputs
                    .chunks(chunk_len)
                    .map(|chunk| {
                        scope.spawn(move || {
                            chunk
                                .iter()
                                .map(|input| self.score(input, requester, weights, now))
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|handle| {
                        handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                    })
                    .collect()
            })
        } else {
            inputs
                .iter()
                .map(|input| self.score(input, requester, weights, now))
                .collect()
        };

        results.sort_by(rank_order);

        histogram!("beacon_ranking_batch_seconds").record(start.elapsed().as_secs_f64());
        debug!("✅ Scored {} candidates in {:?}", results.len(), start.elapsed());
        results
    }
}

/// Descending score, then ascending user id
pub fn rank_order(a: &RankingResult, b: &RankingResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.user_id.cmp(&b.user_id))
}
