//! Beacon Common Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Shared record types, configuration and the error taxonomy used by every
//! Beacon crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::BeaconConfig;
pub use error::{DiscoveryError, Result};
pub use types::{
    is_expired, Broadcast, Page, PresenceRecord, RankingWeights, UserId, WeightValidation,
    WeightsUpdate,
};
