//! Discovery services
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Each service wraps one repository with validation, timestamps and
//! metrics. `DiscoveryService` composes them.

use beacon_common::{DiscoveryError, Result};

pub mod broadcast;
pub mod discovery;
pub mod presence;
pub mod profile;
pub mod ranking_config;

pub use broadcast::BroadcastService;
pub use discovery::{DiscoveryService, SearchMetadata, SearchResponse, SearchResultItem};
pub use presence::PresenceService;
pub use profile::{ProfileProvider, StaticProfileProvider, UserProfile};
pub use ranking_config::RankingConfigStore;

/// Reject blank user ids before they reach storage
pub(crate) fn ensure_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(DiscoveryError::validation("user id must not be empty"));
    }
    Ok(())
}

/// Turn caller supplied paging into `(limit, offset)`, capping the limit
pub(crate) fn page_bounds(limit: i64, offset: i64, max_page_size: usize) -> Result<(usize, usize)> {
    if limit < 0 {
        return Err(DiscoveryError::validation(format!("limit must not be negative, got {limit}")));
    }
    if offset < 0 {
        return Err(DiscoveryError::validation(format!("offset must not be negative, got {offset}")));
    }
    let limit = usize::try_from(limit).unwrap_or(usize::MAX).min(max_page_size);
    let offset = usize::try_from(offset)
        .map_err(|_| DiscoveryError::validation("offset is out of range"))?;
    Ok((limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(20, 0, 100).unwrap(), (20, 0));
        assert_eq!(page_bounds(500, 40, 100).unwrap(), (100, 40));
        assert_eq!(page_bounds(0, 0, 100).unwrap(), (0, 0));
        assert!(matches!(page_bounds(-1, 0, 100), Err(DiscoveryError::Validation(_))));
        assert!(matches!(page_bounds(10, -5, 100), Err(DiscoveryError::Validation(_))));
    }

    #[test]
    fn test_ensure_user_id() {
        assert!(ensure_user_id("@alice:beacon.local").is_ok());
        assert!(ensure_user_id("   ").is_err());
    }
}
