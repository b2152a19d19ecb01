//! Artifact Cache (spec §4.2). All operations are soft: a failed `Put` logs
//! and returns success, a failed `Get` returns `Miss`. Cache must never cause
//! an operation to fail or a response to be withheld.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::cache as storage;
use crate::models::cache::{tags_for, ttl_seconds_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(JsonValue),
    Miss,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    pool: PgPool,
}

impl ArtifactCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> CacheLookup {
        match storage::fetch(&self.pool, key).await {
            Ok(Some(entry)) => {
                if entry.is_expired(Utc::now()) {
                    CacheLookup::Miss
                } else {
                    CacheLookup::Hit(entry.body)
                }
            }
            Ok(None) => CacheLookup::Miss,
            Err(err) => {
                tracing::warn!(error = %err, key, "cache get failed, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    pub async fn put(&self, key: &str, operation: &str, user_id: Uuid, body: &JsonValue) {
        let ttl = ttl_seconds_for(operation);
        let tags = tags_for(operation, user_id, "v1");
        if let Err(err) = storage::upsert(&self.pool, key, operation, user_id, body, ttl, &tags).await {
            tracing::warn!(error = %err, key, "cache put failed, swallowing");
        }
    }

    pub async fn purge_by_tag(&self, tag: &str) -> u64 {
        storage::purge_by_tag(&self.pool, tag).await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, tag, "cache purge failed, swallowing");
            0
        })
    }
}

/// Deterministic cache key: `"<op>/<userId>/<sha256(sorted(params))[:16]>"`,
/// spec §3/§4.2. The JSON must be canonicalized by key so argument order
/// never changes the key.
pub fn derive_key(operation: &str, user_id: Uuid, params: &JsonValue) -> String {
    let canonical = canonicalize(params);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let hex = hex_encode(&digest)[..16].to_string();
    format!("{operation}/{user_id}/{hex}")
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serialize a JSON value with object keys sorted recursively, so permuting
/// key order in the input never changes the output.
fn canonicalize(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        JsonValue::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Strip caller-supplied `userId` from params before hashing, per spec §3
/// (`key = "<op>/<userId>/sha256(sorted(params - {userId}))[:16]"`).
pub fn params_without_user_id(mut params: JsonValue) -> JsonValue {
    if let JsonValue::Object(map) = &mut params {
        map.remove("userId");
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_stable_under_key_permutation() {
        let uid = Uuid::nil();
        let a = json!({"url": "https://example.com", "waitTime": 500});
        let b = json!({"waitTime": 500, "url": "https://example.com"});
        assert_eq!(
            derive_key("links", uid, &a),
            derive_key("links", uid, &b)
        );
    }

    #[test]
    fn key_changes_with_different_params() {
        let uid = Uuid::nil();
        let a = json!({"url": "https://example.com"});
        let b = json!({"url": "https://example.org"});
        assert_ne!(derive_key("links", uid, &a), derive_key("links", uid, &b));
    }

    #[test]
    fn user_id_stripped_before_hashing() {
        let uid = Uuid::nil();
        let with_uid = json!({"url": "https://example.com", "userId": "abc"});
        let without = json!({"url": "https://example.com"});
        let stripped = params_without_user_id(with_uid);
        assert_eq!(derive_key("links", uid, &stripped), derive_key("links", uid, &without));
    }
}
