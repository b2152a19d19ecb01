use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PastDue,
    Trialing,
    Unpaid,
}

impl SubscriptionStatus {
    /// Whether this status should carry `plan == pro` privileges.
    pub fn is_entitled(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub plan: Plan,
    pub started_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

/// Classification of a subscription-change event, spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeClassification {
    pub is_upgrade: bool,
    pub is_activation: bool,
    pub is_downgrade: bool,
    pub is_new_subscription: bool,
    pub is_status_change: bool,
}

impl ChangeClassification {
    /// Compute the classification from the previously-stored subscription
    /// (if any) and the user's current cached plan, against the incoming
    /// `(status, plan)` pair.
    pub fn compute(
        previous: Option<&Subscription>,
        current_plan: Plan,
        new_status: SubscriptionStatus,
        new_plan: Plan,
    ) -> Self {
        let is_new_subscription = previous.is_none();
        let is_status_change = previous.map(|p| p.status != new_status).unwrap_or(true);

        let is_upgrade = current_plan == Plan::Free && new_plan == Plan::Pro;
        let is_activation = new_plan == Plan::Pro && new_status.is_entitled();
        let is_downgrade = current_plan == Plan::Pro
            && (new_plan == Plan::Free || !new_status.is_entitled());

        Self {
            is_upgrade,
            is_activation,
            is_downgrade,
            is_new_subscription,
            is_status_change,
        }
    }

    /// Whether this event should credit the `initial_pro` bonus.
    pub fn should_grant_pro(&self) -> bool {
        (self.is_upgrade || self.is_activation) && (self.is_new_subscription || self.is_status_change)
    }

    /// Whether this event should downgrade to free and record the cancellation.
    pub fn should_downgrade(&self) -> bool {
        self.is_downgrade && self.is_status_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(status: SubscriptionStatus, plan: Plan) -> Subscription {
        Subscription {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            status,
            plan,
            started_at: Utc::now(),
            cancelled_at: None,
            current_period_end: None,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn new_activation_grants_pro() {
        let c = ChangeClassification::compute(
            None,
            Plan::Free,
            SubscriptionStatus::Active,
            Plan::Pro,
        );
        assert!(c.should_grant_pro());
        assert!(!c.should_downgrade());
    }

    #[test]
    fn repeated_active_status_does_not_regrant() {
        let previous = sub(SubscriptionStatus::Active, Plan::Pro);
        let c = ChangeClassification::compute(
            Some(&previous),
            Plan::Pro,
            SubscriptionStatus::Active,
            Plan::Pro,
        );
        assert!(!c.should_grant_pro());
    }

    #[test]
    fn cancellation_downgrades() {
        let previous = sub(SubscriptionStatus::Active, Plan::Pro);
        let c = ChangeClassification::compute(
            Some(&previous),
            Plan::Pro,
            SubscriptionStatus::Cancelled,
            Plan::Free,
        );
        assert!(c.should_downgrade());
        assert!(!c.should_grant_pro());
    }
}
