//! Error types for Beacon
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Every discovery operation reports failures through [`DiscoveryError`].
//! Validation failures are raised before any storage mutation is attempted;
//! storage failures are propagated to the caller unchanged.

use thiserror::Error;

/// Beacon error types
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Bad input: message length, hour bounds, pagination, empty weight update
    #[error("Validation error: {0}")]
    Validation(String),

    /// No presence record or broadcast for the requested user
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for Beacon operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl DiscoveryError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Short machine-readable kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<figment::Error> for DiscoveryError {
    fn from(err: figment::Error) -> Self {
        DiscoveryError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DiscoveryError {
    fn from(err: tokio::task::JoinError) -> Self {
        DiscoveryError::Internal(format!("background task failed: {err}"))
    }
}
