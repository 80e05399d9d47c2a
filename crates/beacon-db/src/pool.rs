//! Database connection pool management for Beacon
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Date: 2025-07-02
//! Version: 0.3.0-alpha

use std::time::{Duration, Instant};

use beacon_common::{config::DatabaseConfig, DiscoveryError, Result};
use metrics::histogram;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

/// Create the shared connection pool
#[instrument(level = "debug", skip(config))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    debug!("🔧 Creating database connection pool");
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_s))
        .min_connections(config.min_idle.unwrap_or(0))
        .connect(&config.url)
        .await
        .map_err(|e| DiscoveryError::Storage(e.to_string()))?;

    histogram!("beacon_db_pool_create_seconds").record(start.elapsed().as_secs_f64());
    info!(
        "✅ Created database connection pool with {} max connections",
        config.max_connections
    );
    Ok(pool)
}

/// Check if the database connection pool is healthy
#[instrument(level = "debug", skip(pool))]
pub async fn check_pool_health(pool: &PgPool) -> Result<bool> {
    let result = sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| DiscoveryError::Storage(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}
