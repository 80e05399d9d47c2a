//! Error types for the search collaborator
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! These errors never leave the adapter: every one of them is turned into a
//! degraded, unranked outcome with a warning.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request timed out after {0:?}")]
    Timeout(Duration),

    #[error("search service returned status {0}")]
    Status(u16),

    #[error("search transport error: {0}")]
    Transport(String),

    #[error("malformed search response: {0}")]
    Malformed(String),

    #[error("invalid search configuration: {0}")]
    Config(String),
}

impl SearchError {
    /// Short label used in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Status(_) => "status",
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
            Self::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Transport(format!("timed out: {err}"))
        } else if err.is_decode() {
            SearchError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            SearchError::Status(status.as_u16())
        } else {
            SearchError::Transport(err.to_string())
        }
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;
