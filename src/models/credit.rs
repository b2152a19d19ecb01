use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::user::Plan;

/// `(userId -> {balance, plan, lastRefill})`, spec §3.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user_id: Uuid,
    pub balance: i64,
    pub plan: Plan,
    pub last_refill: Option<DateTime<Utc>>,
}

/// Append-only ledger row, spec §3. `reason` is a free-form string so that
/// `op:<name>` reasons don't need a variant per operation.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub delta: i64,
    pub reason: String,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

pub const REASON_INITIAL_SIGNUP: &str = "initial_signup";
pub const REASON_INITIAL_PRO: &str = "initial_pro";
pub const REASON_MONTHLY_REFILL: &str = "monthly_refill";
pub const REASON_SUBSCRIPTION_CANCELLED: &str = "subscription_cancelled";
pub const REASON_ADMIN_ADJUST: &str = "admin_adjust";

/// Build the `op:<name>` ledger reason for a pipeline deduction.
pub fn op_reason(operation: &str) -> String {
    format!("op:{operation}")
}
