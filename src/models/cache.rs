use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A cached operation result, spec §3/§4.2.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub key: String,
    pub operation: String,
    pub user_id: uuid::Uuid,
    pub body: JsonValue,
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    pub tags: Vec<String>,
}

impl CachedArtifact {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at).num_seconds() >= self.ttl_seconds
    }
}

/// TTL per operation, spec §6 `CACHE_TTL_SECONDS`.
pub fn ttl_seconds_for(operation: &str) -> i64 {
    match operation {
        "screenshot" => 300,
        "markdown" => 60,
        "content" => 60,
        "scrape" => 60,
        "links" => 60,
        "search" => 120,
        "pdf" => 300,
        "json_extraction" => 300,
        _ => 60,
    }
}

/// Build the tag set a cached artifact is purgeable by, spec §3.
pub fn tags_for(operation: &str, user_id: uuid::Uuid, version_tag: &str) -> Vec<String> {
    vec![
        format!("user-{user_id}"),
        format!("operation-{operation}"),
        version_tag.to_string(),
    ]
}
