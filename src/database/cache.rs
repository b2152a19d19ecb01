//! Raw storage for cached artifacts (spec §3 `CachedArtifact`, §2 "Storage").

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::cache::CachedArtifact;

pub async fn fetch(pool: &PgPool, key: &str) -> sqlx::Result<Option<CachedArtifact>> {
    sqlx::query_as(
        "SELECT key, operation, user_id, body, cached_at, ttl_seconds, tags FROM cache_entries WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

pub async fn upsert(
    pool: &PgPool,
    key: &str,
    operation: &str,
    user_id: Uuid,
    body: &JsonValue,
    ttl_seconds: i64,
    tags: &[String],
) -> sqlx::Result<()> {
    sqlx::query(
        r#"INSERT INTO cache_entries (key, operation, user_id, body, cached_at, ttl_seconds, tags)
           VALUES ($1, $2, $3, $4, NOW(), $5, $6)
           ON CONFLICT (key) DO UPDATE SET body = $4, cached_at = NOW(), ttl_seconds = $5, tags = $6"#,
    )
    .bind(key)
    .bind(operation)
    .bind(user_id)
    .bind(body)
    .bind(ttl_seconds)
    .bind(tags)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn purge_by_tag(pool: &PgPool, tag: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE $1 = ANY(tags)")
        .bind(tag)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Sweep rows whose TTL has elapsed. Defense in depth alongside the
/// read-time expiry check in [`crate::cache::ArtifactCache::get`].
pub async fn sweep_expired(pool: &PgPool) -> sqlx::Result<u64> {
    let now = Utc::now();
    let result = sqlx::query(
        "DELETE FROM cache_entries WHERE cached_at + (ttl_seconds || ' seconds')::interval < $1",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
