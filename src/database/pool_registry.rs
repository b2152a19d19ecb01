//! Durable projection of the worker registry (spec §3/§4.4/§9: "startup
//! reloads it under a concurrency barrier before accepting RPCs"). The
//! authoritative in-memory copy lives in [`crate::pool::PoolManager`]; this
//! module is only consulted on boot and mirrored on every mutation.

use sqlx::PgPool;

use crate::models::worker::WorkerRecord;

pub async fn load_all(pool: &PgPool) -> sqlx::Result<Vec<WorkerRecord>> {
    sqlx::query_as("SELECT * FROM pool_workers")
        .fetch_all(pool)
        .await
}

pub async fn upsert(pool: &PgPool, record: &WorkerRecord) -> sqlx::Result<()> {
    sqlx::query(
        r#"INSERT INTO pool_workers (id, status, session_id, last_activity, created, error_message, error_count)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (id) DO UPDATE SET
             status = $2, session_id = $3, last_activity = $4, error_message = $6, error_count = $7"#,
    )
    .bind(&record.id)
    .bind(record.status)
    .bind(&record.session_id)
    .bind(record.last_activity)
    .bind(record.created)
    .bind(&record.error_message)
    .bind(record.error_count)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove(pool: &PgPool, id: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM pool_workers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_all(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM pool_workers").execute(pool).await?;
    Ok(())
}
