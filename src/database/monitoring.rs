//! Raw storage for the monitoring engine's relational tables (spec §3/§4.7).
//! Indices required: `(endpoint, timestamp DESC)`, `(success)`, `last_updated`
//! -- declared in migrations, not here.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::monitoring::{EndpointStats, TestResult, TestSession};

pub async fn start_session(pool: &PgPool) -> sqlx::Result<TestSession> {
    sqlx::query_as(
        r#"INSERT INTO test_sessions (id, started_at, finished_at, total, succeeded, failed, avg_response_time_ms)
           VALUES ($1, NOW(), NULL, 0, 0, 0, NULL)
           RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .fetch_one(pool)
    .await
}

pub async fn finish_session(
    pool: &PgPool,
    session_id: Uuid,
    total: i32,
    succeeded: i32,
    failed: i32,
    avg_response_time_ms: Option<f64>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"UPDATE test_sessions
           SET finished_at = NOW(), total = $2, succeeded = $3, failed = $4, avg_response_time_ms = $5
           WHERE id = $1"#,
    )
    .bind(session_id)
    .bind(total)
    .bind(succeeded)
    .bind(failed)
    .bind(avg_response_time_ms)
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_result(
    pool: &PgPool,
    session_id: Uuid,
    endpoint: &str,
    success: bool,
    response_time_ms: i64,
    status_code: Option<i32>,
    error_message: Option<&str>,
    response_size: Option<i64>,
    credits_cost: Option<i64>,
) -> sqlx::Result<TestResult> {
    sqlx::query_as(
        r#"INSERT INTO test_results
           (id, session_id, endpoint, success, response_time_ms, status_code, error_message, response_size, credits_cost, timestamp)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
           RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(endpoint)
    .bind(success)
    .bind(response_time_ms)
    .bind(status_code)
    .bind(error_message)
    .bind(response_size)
    .bind(credits_cost)
    .fetch_one(pool)
    .await
}

pub struct ResultsFilter {
    pub endpoint: Option<String>,
    pub limit: i64,
    pub offset: i64,
    pub success_only: Option<bool>,
    pub since: Option<DateTime<Utc>>,
}

pub async fn query_results(pool: &PgPool, filter: &ResultsFilter) -> sqlx::Result<Vec<TestResult>> {
    let limit = filter.limit.clamp(1, 1000);
    sqlx::query_as(
        r#"SELECT * FROM test_results
           WHERE ($1::text IS NULL OR endpoint = $1)
             AND ($2::bool IS NULL OR success = $2)
             AND ($3::timestamptz IS NULL OR timestamp >= $3)
           ORDER BY timestamp DESC
           LIMIT $4 OFFSET $5"#,
    )
    .bind(&filter.endpoint)
    .bind(filter.success_only)
    .bind(filter.since)
    .bind(limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await
}

pub async fn fetch_endpoint_stats(pool: &PgPool, endpoint: &str) -> sqlx::Result<Option<EndpointStats>> {
    sqlx::query_as("SELECT * FROM endpoint_stats WHERE endpoint = $1")
        .bind(endpoint)
        .fetch_optional(pool)
        .await
}

pub async fn all_endpoint_stats(pool: &PgPool) -> sqlx::Result<Vec<EndpointStats>> {
    sqlx::query_as("SELECT * FROM endpoint_stats ORDER BY endpoint")
        .fetch_all(pool)
        .await
}

pub async fn upsert_endpoint_stats(pool: &PgPool, stats: &EndpointStats) -> sqlx::Result<()> {
    sqlx::query(
        r#"INSERT INTO endpoint_stats
           (endpoint, total_runs, total_successes, total_failures, min_response_time_ms, max_response_time_ms,
            last_success_at, last_failure_at, last_updated)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
           ON CONFLICT (endpoint) DO UPDATE SET
             total_runs = $2, total_successes = $3, total_failures = $4,
             min_response_time_ms = $5, max_response_time_ms = $6,
             last_success_at = $7, last_failure_at = $8, last_updated = $9"#,
    )
    .bind(&stats.endpoint)
    .bind(stats.total_runs)
    .bind(stats.total_successes)
    .bind(stats.total_failures)
    .bind(stats.min_response_time_ms)
    .bind(stats.max_response_time_ms)
    .bind(stats.last_success_at)
    .bind(stats.last_failure_at)
    .bind(stats.last_updated)
    .execute(pool)
    .await?;
    Ok(())
}
