use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "error_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ErrorLog {
    pub id: Uuid,
    pub fingerprint: String,
    pub user_id: Option<Uuid>,
    pub level: ErrorLevel,
    pub source: String,
    pub operation: String,
    pub status_code: Option<i32>,
    pub message: String,
    pub stack_trace: Option<String>,
    pub context: JsonValue,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub occurrence_count: i32,
    pub resolved: bool,
}
