//! Raw storage + dedup logic for [`crate::models::error_log::ErrorLog`] rows
//! (spec §3/§7).

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::fingerprint;
use crate::models::error_log::{ErrorLevel, ErrorLog};

/// Record an error, deduplicating by fingerprint: a repeat increments
/// `occurrence_count` and bumps `last_occurrence` instead of inserting a new row.
pub async fn record(
    pool: &PgPool,
    level: ErrorLevel,
    source: &str,
    operation: &str,
    user_id: Option<Uuid>,
    status_code: Option<i32>,
    message: &str,
    stack_trace: Option<&str>,
    context: JsonValue,
) -> sqlx::Result<ErrorLog> {
    let fp = fingerprint::compute(message, operation, status_code.map(|c| c.to_string()).as_deref());

    let existing: Option<ErrorLog> = sqlx::query_as("SELECT * FROM error_logs WHERE fingerprint = $1")
        .bind(&fp)
        .fetch_optional(pool)
        .await?;

    if let Some(mut row) = existing {
        sqlx::query(
            "UPDATE error_logs SET occurrence_count = occurrence_count + 1, last_occurrence = NOW() WHERE id = $1",
        )
        .bind(row.id)
        .execute(pool)
        .await?;
        row.occurrence_count += 1;
        return Ok(row);
    }

    let id = Uuid::new_v4();
    let row: ErrorLog = sqlx::query_as(
        r#"INSERT INTO error_logs
           (id, fingerprint, user_id, level, source, operation, status_code, message, stack_trace, context,
            first_occurrence, last_occurrence, occurrence_count, resolved)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW(), 1, FALSE)
           RETURNING *"#,
    )
    .bind(id)
    .bind(&fp)
    .bind(user_id)
    .bind(level)
    .bind(source)
    .bind(operation)
    .bind(status_code)
    .bind(message)
    .bind(stack_trace)
    .bind(context)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
