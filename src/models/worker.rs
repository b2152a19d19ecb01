use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pool worker's lifecycle state, spec §3/§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "worker_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Error,
    Closed,
}

/// The pool manager's projection of a worker -- spec §3 "BrowserWorker (pool record)".
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    pub status: WorkerStatus,
    pub session_id: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub error_message: Option<String>,
    pub error_count: i32,
}

impl WorkerRecord {
    pub fn new_idle(id: String, session_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: WorkerStatus::Idle,
            session_id,
            last_activity: now,
            created: now,
            error_message: None,
            error_count: 0,
        }
    }
}

/// A 64-hex-character opaque id, the one shape that `ReportStatus` refuses to
/// admit as a brand-new worker even when the registry has capacity -- spec §4.4.
pub fn looks_like_opaque_default(id: &str) -> bool {
    id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex64_is_opaque() {
        assert!(looks_like_opaque_default(&"a".repeat(64)));
    }

    #[test]
    fn named_worker_is_not_opaque() {
        assert!(!looks_like_opaque_default("browser-1700000000-ab12"));
    }
}
