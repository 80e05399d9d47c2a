//! PostgreSQL repositories
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Date: 2025-07-02
//! Version: 0.3.0-alpha
//!
//! Every mutation is a single statement, so row-level atomicity comes from
//! postgres itself. Broadcasts are keyed by `user_id`, which makes
//! "at most one broadcast per user" a schema guarantee.

use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use beacon_common::{Broadcast, DiscoveryError, PresenceRecord, RankingWeights, Result, UserId};
use chrono::{DateTime, Utc};
use metrics::histogram;
use sqlx::{
    postgres::{PgPool, PgRow},
    Row,
};

use crate::{BroadcastRepository, PresenceRepository, Repositories, WeightsRepository};

const PRESENCE_COLUMNS: &str = "user_id, is_available, last_available_at";
const BROADCAST_COLUMNS: &str =
    "id, user_id, message, is_active, expires_at, created_at, updated_at, deleted_at";

fn storage(err: sqlx::Error) -> DiscoveryError {
    DiscoveryError::Storage(err.to_string())
}

fn observe(query: &'static str, start: Instant) {
    histogram!("beacon_db_query_seconds", "query" => query).record(start.elapsed().as_secs_f64());
}

fn presence_from_row(row: &PgRow) -> Result<PresenceRecord> {
    Ok(PresenceRecord {
        user_id: row.try_get("user_id").map_err(storage)?,
        is_available: row.try_get("is_available").map_err(storage)?,
        last_available_at: row.try_get("last_available_at").map_err(storage)?,
    })
}

fn broadcast_from_row(row: &PgRow) -> Result<Broadcast> {
    Ok(Broadcast {
        id: row.try_get("id").map_err(storage)?,
        user_id: row.try_get("user_id").map_err(storage)?,
        message: row.try_get("message").map_err(storage)?,
        is_active: row.try_get("is_active").map_err(storage)?,
        expires_at: row.try_get("expires_at").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
        deleted_at: row.try_get("deleted_at").map_err(storage)?,
    })
}

/// Build the three repositories over one pool
pub fn repositories(pool: PgPool) -> Repositories {
    Repositories {
        presence: Arc::new(PgPresenceRepository::new(pool.clone())),
        broadcasts: Arc::new(PgBroadcastRepository::new(pool.clone())),
        weights: Arc::new(PgWeightsRepository::new(pool)),
    }
}

#[derive(Debug, Clone)]
pub struct PgPresenceRepository {
    pool: PgPool,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn get(&self, user_id: &str) -> Result<Option<PresenceRecord>> {
        let start = Instant::now();
        let row = sqlx::query(&format!(
            "SELECT {PRESENCE_COLUMNS} FROM user_presence WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        observe("presence_get", start);
        row.as_ref().map(presence_from_row).transpose()
    }

    async fn set_available(
        &self,
        user_id: &str,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<PresenceRecord> {
        let start = Instant::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO user_presence (user_id, is_available, last_available_at, updated_at)
            VALUES ($1, $2, CASE WHEN $2 THEN $3 END, $3)
            ON CONFLICT (user_id) DO UPDATE
                SET is_available = EXCLUDED.is_available,
                    last_available_at = CASE
                        WHEN EXCLUDED.is_available THEN EXCLUDED.updated_at
                        ELSE user_presence.last_available_at
                    END,
                    updated_at = EXCLUDED.updated_at
            RETURNING {PRESENCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(is_available)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        observe("presence_set", start);
        presence_from_row(&row)
    }

    async fn heartbeat(&self, user_id: &str, now: DateTime<Utc>) -> Result<PresenceRecord> {
        let start = Instant::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO user_presence (user_id, is_available, last_available_at, updated_at)
            VALUES ($1, TRUE, $2, $2)
            ON CONFLICT (user_id) DO UPDATE
                SET is_available = TRUE,
                    last_available_at = EXCLUDED.last_available_at,
                    updated_at = EXCLUDED.updated_at
            RETURNING {PRESENCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        observe("presence_heartbeat", start);
        presence_from_row(&row)
    }

    async fn list_available(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<PresenceRecord>, u64)> {
        let start = Instant::now();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRESENCE_COLUMNS} FROM user_presence
            WHERE is_available
            ORDER BY last_available_at DESC NULLS LAST, user_id ASC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_presence WHERE is_available")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        observe("presence_list", start);

        let records = rows.iter().map(presence_from_row).collect::<Result<Vec<_>>>()?;
        Ok((records, total.max(0) as u64))
    }

    async fn all_available(&self) -> Result<Vec<PresenceRecord>> {
        let start = Instant::now();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRESENCE_COLUMNS} FROM user_presence
            WHERE is_available
            ORDER BY last_available_at DESC NULLS LAST, user_id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        observe("presence_all", start);
        rows.iter().map(presence_from_row).collect()
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_presence
            SET is_available = FALSE, updated_at = NOW()
            WHERE is_available AND (last_available_at IS NULL OR last_available_at < $1)
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct PgBroadcastRepository {
    pool: PgPool,
}

impl PgBroadcastRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BroadcastRepository for PgBroadcastRepository {
    async fn get(&self, user_id: &str) -> Result<Option<Broadcast>> {
        let row = sqlx::query(&format!(
            "SELECT {BROADCAST_COLUMNS} FROM broadcasts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.as_ref().map(broadcast_from_row).transpose()
    }

    async fn upsert(&self, broadcast: Broadcast) -> Result<Broadcast> {
        let start = Instant::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO broadcasts
                (id, user_id, message, is_active, expires_at, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE
                SET id = EXCLUDED.id,
                    message = EXCLUDED.message,
                    is_active = EXCLUDED.is_active,
                    expires_at = EXCLUDED.expires_at,
                    created_at = EXCLUDED.created_at,
                    updated_at = EXCLUDED.updated_at,
                    deleted_at = EXCLUDED.deleted_at
            RETURNING {BROADCAST_COLUMNS}
            "#
        ))
        .bind(broadcast.id)
        .bind(&broadcast.user_id)
        .bind(&broadcast.message)
        .bind(broadcast.is_active)
        .bind(broadcast.expires_at)
        .bind(broadcast.created_at)
        .bind(broadcast.updated_at)
        .bind(broadcast.deleted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        observe("broadcast_upsert", start);
        broadcast_from_row(&row)
    }

    async fn update_active(
        &self,
        user_id: &str,
        message: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Broadcast>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE broadcasts
            SET message = $2,
                expires_at = COALESCE($3, expires_at),
                updated_at = $4
            WHERE user_id = $1 AND is_active AND deleted_at IS NULL AND expires_at >= $4
            RETURNING {BROADCAST_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(message)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.as_ref().map(broadcast_from_row).transpose()
    }

    async fn deactivate(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE broadcasts
            SET is_active = FALSE, deleted_at = $2, updated_at = $2
            WHERE user_id = $1 AND is_active
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_active_for_users(
        &self,
        user_ids: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<HashMap<UserId, Broadcast>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let start = Instant::now();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BROADCAST_COLUMNS} FROM broadcasts
            WHERE user_id = ANY($1) AND is_active AND deleted_at IS NULL AND expires_at >= $2
            "#
        ))
        .bind(user_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        observe("broadcast_batch", start);

        rows.iter()
            .map(|row| broadcast_from_row(row).map(|b| (b.user_id.clone(), b)))
            .collect()
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE broadcasts
            SET is_active = FALSE, deleted_at = $1, updated_at = $1
            WHERE is_active AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM broadcasts
            WHERE NOT is_active AND COALESCE(deleted_at, updated_at) < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct PgWeightsRepository {
    pool: PgPool,
}

impl PgWeightsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WeightsRepository for PgWeightsRepository {
    async fn load(&self, name: &str) -> Result<Option<RankingWeights>> {
        let row = sqlx::query(
            r#"
            SELECT semantic_similarity, interest_overlap, geo_proximity, recent_activity
            FROM ranking_weights WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(|row| {
            Ok(RankingWeights {
                semantic_similarity: row.try_get("semantic_similarity").map_err(storage)?,
                interest_overlap: row.try_get("interest_overlap").map_err(storage)?,
                geo_proximity: row.try_get("geo_proximity").map_err(storage)?,
                recent_activity: row.try_get("recent_activity").map_err(storage)?,
            })
        })
        .transpose()
    }

    async fn store(&self, name: &str, weights: &RankingWeights) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ranking_weights
                (name, semantic_similarity, interest_overlap, geo_proximity, recent_activity, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (name) DO UPDATE
                SET semantic_similarity = EXCLUDED.semantic_similarity,
                    interest_overlap = EXCLUDED.interest_overlap,
                    geo_proximity = EXCLUDED.geo_proximity,
                    recent_activity = EXCLUDED.recent_activity,
                    updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(name)
        .bind(weights.semantic_similarity)
        .bind(weights.interest_overlap)
        .bind(weights.geo_proximity)
        .bind(weights.recent_activity)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
