//! Schema bootstrap for the postgres backend
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Date: 2025-07-02
//! Version: 0.3.0-alpha

use beacon_common::{DiscoveryError, RankingWeights, Result};
use sqlx::postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::DEFAULT_WEIGHTS_NAME;

/// Migration version
pub const MIGRATION_VERSION: &str = "20250702000000";

/// `broadcasts.message` is sized to `beacon_common::config::MESSAGE_COLUMN_CHARS`
const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS user_presence (
        user_id TEXT PRIMARY KEY,
        is_available BOOLEAN NOT NULL DEFAULT FALSE,
        last_available_at TIMESTAMP WITH TIME ZONE,
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_user_presence_available
        ON user_presence (last_available_at DESC NULLS LAST, user_id)
        WHERE is_available
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS broadcasts (
        user_id TEXT PRIMARY KEY,
        id UUID NOT NULL,
        message VARCHAR(200) NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMP WITH TIME ZONE
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_broadcasts_expiry
        ON broadcasts (expires_at)
        WHERE is_active
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_broadcasts_retention
        ON broadcasts (deleted_at)
        WHERE NOT is_active
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ranking_weights (
        name TEXT PRIMARY KEY,
        semantic_similarity DOUBLE PRECISION NOT NULL,
        interest_overlap DOUBLE PRECISION NOT NULL,
        geo_proximity DOUBLE PRECISION NOT NULL,
        recent_activity DOUBLE PRECISION NOT NULL,
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Run database migrations and seed the default weight set
#[instrument(level = "debug", skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    debug!("🔧 Starting database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version TEXT PRIMARY KEY,
            applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DiscoveryError::Storage(e.to_string()))?;

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DiscoveryError::Storage(e.to_string()))?;
    }

    let defaults = RankingWeights::default();
    sqlx::query(
        r#"
        INSERT INTO ranking_weights
            (name, semantic_similarity, interest_overlap, geo_proximity, recent_activity)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(DEFAULT_WEIGHTS_NAME)
    .bind(defaults.semantic_similarity)
    .bind(defaults.interest_overlap)
    .bind(defaults.geo_proximity)
    .bind(defaults.recent_activity)
    .execute(pool)
    .await
    .map_err(|e| DiscoveryError::Storage(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO _migrations (version)
        VALUES ($1)
        ON CONFLICT (version) DO NOTHING
        "#,
    )
    .bind(MIGRATION_VERSION)
    .execute(pool)
    .await
    .map_err(|e| DiscoveryError::Storage(e.to_string()))?;

    info!("✅ Database migrations completed");
    Ok(())
}
