use serde::{Deserialize, Serialize};

/// Subscription tier. The core only reads this -- it is written by the
/// billing/subscription collaborator (spec §3, out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
}

impl Default for Plan {
    fn default() -> Self {
        Plan::Free
    }
}
