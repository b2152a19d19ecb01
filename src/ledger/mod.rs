//! Credit Ledger (spec §4.1).
//!
//! `Deduct`'s two writes (transaction row, then balance row) are intentionally
//! not wrapped in a single database transaction -- spec §5/§9 calls this out
//! as an accepted race, reconcilable offline by summing deltas. Every other
//! operation here *is* transactional where it touches more than one row,
//! because the spec's idempotence laws (§8) require it.

use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::ledger::LedgerError;
use crate::models::credit::{
    CreditBalance, CreditTransaction, REASON_INITIAL_PRO, REASON_INITIAL_SIGNUP,
    REASON_MONTHLY_REFILL, REASON_SUBSCRIPTION_CANCELLED,
};
use crate::models::subscription::{ChangeClassification, Subscription, SubscriptionStatus};
use crate::models::user::Plan;

#[derive(Debug, Clone)]
pub struct Ledger {
    pool: PgPool,
}

impl Ledger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `AssignInitial(userId)` -- spec §4.1.
    pub async fn assign_initial(
        &self,
        user_id: Uuid,
        initial_free: i64,
    ) -> Result<CreditBalance, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM credit_balances WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(LedgerError::AlreadyAssigned);
        }

        sqlx::query(
            "INSERT INTO credit_balances (user_id, balance, plan, last_refill) VALUES ($1, $2, 'free', NULL)",
        )
        .bind(user_id)
        .bind(initial_free)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO credit_transactions (id, user_id, delta, reason, metadata, created_at)
               VALUES ($1, $2, $3, $4, $5, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(initial_free)
        .bind(REASON_INITIAL_SIGNUP)
        .bind(json!({}))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_balance(user_id).await
    }

    /// `GetBalance(userId)` -- spec §4.1.
    pub async fn get_balance(&self, user_id: Uuid) -> Result<CreditBalance, LedgerError> {
        sqlx::query_as::<_, CreditBalance>(
            "SELECT user_id, balance, plan, last_refill FROM credit_balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::NotFound)
    }

    /// `Deduct(userId, amount, reason, metadata)` -- spec §4.1.
    ///
    /// Ordering is fixed: the transaction row is written before the balance
    /// row is updated, so an interrupted deduct leaves a negative-delta
    /// ledger entry that reconciliation can detect rather than a silent
    /// overspend.
    pub async fn deduct(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        metadata: Option<JsonValue>,
    ) -> Result<CreditBalance, LedgerError> {
        debug_assert!(amount > 0, "Deduct amount must be positive");

        let balance = self.get_balance(user_id).await?;
        if balance.balance < amount {
            return Err(LedgerError::Insufficient {
                balance: balance.balance,
                amount,
            });
        }

        sqlx::query(
            r#"INSERT INTO credit_transactions (id, user_id, delta, reason, metadata, created_at)
               VALUES ($1, $2, $3, $4, $5, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(-amount)
        .bind(reason)
        .bind(metadata.unwrap_or_else(|| json!({})))
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE credit_balances SET balance = balance - $1 WHERE user_id = $2")
            .bind(amount)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.get_balance(user_id).await
    }

    /// `ApplyMonthlyRefill(userId, subscriptionId, orderId)` -- spec §4.1.
    /// No-op unless `plan == pro`. Idempotent on `orderId`.
    pub async fn apply_monthly_refill(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        order_id: &str,
        monthly_refill: i64,
    ) -> Result<CreditBalance, LedgerError> {
        let balance = self.get_balance(user_id).await?;
        if balance.plan != Plan::Pro {
            return Ok(balance);
        }

        if self.has_recent_refill(user_id, order_id).await? {
            return Err(LedgerError::AlreadyApplied);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO credit_transactions (id, user_id, delta, reason, metadata, created_at)
               VALUES ($1, $2, $3, $4, $5, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(monthly_refill)
        .bind(REASON_MONTHLY_REFILL)
        .bind(json!({ "orderId": order_id, "subscriptionId": subscription_id }))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE credit_balances SET balance = balance + $1, last_refill = NOW() WHERE user_id = $2",
        )
        .bind(monthly_refill)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_balance(user_id).await
    }

    async fn has_recent_refill(&self, user_id: Uuid, order_id: &str) -> Result<bool, LedgerError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"SELECT id FROM credit_transactions
               WHERE user_id = $1 AND reason = $2 AND metadata ->> 'orderId' = $3
               LIMIT 1"#,
        )
        .bind(user_id)
        .bind(REASON_MONTHLY_REFILL)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn has_applied_subscription_event(
        &self,
        user_id: Uuid,
        reason: &str,
        subscription_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"SELECT id FROM credit_transactions
               WHERE user_id = $1 AND reason = $2 AND metadata ->> 'subscriptionId' = $3
               LIMIT 1"#,
        )
        .bind(user_id)
        .bind(reason)
        .bind(subscription_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// `OnSubscriptionChange(userId, subscriptionId, status, plan)` -- spec §4.1.
    pub async fn on_subscription_change(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        plan: Plan,
        initial_pro: i64,
    ) -> Result<CreditBalance, LedgerError> {
        let balance = self.get_balance(user_id).await?;
        let previous = self.fetch_subscription(subscription_id).await?;

        let classification =
            ChangeClassification::compute(previous.as_ref(), balance.plan, status, plan);

        self.upsert_subscription(subscription_id, user_id, status, plan)
            .await?;

        if classification.should_grant_pro()
            && !self
                .has_applied_subscription_event(user_id, REASON_INITIAL_PRO, subscription_id)
                .await?
        {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"INSERT INTO credit_transactions (id, user_id, delta, reason, metadata, created_at)
                   VALUES ($1, $2, $3, $4, $5, NOW())"#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(initial_pro)
            .bind(REASON_INITIAL_PRO)
            .bind(json!({ "subscriptionId": subscription_id }))
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE credit_balances SET balance = balance + $1, plan = 'pro' WHERE user_id = $2")
                .bind(initial_pro)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        } else if classification.should_downgrade()
            && !self
                .has_applied_subscription_event(
                    user_id,
                    REASON_SUBSCRIPTION_CANCELLED,
                    subscription_id,
                )
                .await?
        {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"INSERT INTO credit_transactions (id, user_id, delta, reason, metadata, created_at)
                   VALUES ($1, $2, 0, $3, $4, NOW())"#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(REASON_SUBSCRIPTION_CANCELLED)
            .bind(json!({ "subscriptionId": subscription_id }))
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE credit_balances SET plan = 'free' WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        self.get_balance(user_id).await
    }

    async fn fetch_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, LedgerError> {
        Ok(sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert_subscription(
        &self,
        subscription_id: Uuid,
        user_id: Uuid,
        status: SubscriptionStatus,
        plan: Plan,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"INSERT INTO subscriptions (id, user_id, status, plan, started_at, cancelled_at, current_period_end, synced_at)
               VALUES ($1, $2, $3, $4, NOW(), NULL, NULL, NOW())
               ON CONFLICT (id) DO UPDATE SET status = $3, plan = $4, synced_at = NOW()"#,
        )
        .bind(subscription_id)
        .bind(user_id)
        .bind(status)
        .bind(plan)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// List transactions for a user, newest first -- used by reconciliation and tests.
pub async fn list_transactions(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<CreditTransaction>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM credit_transactions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Reconcile the cached balance against the ledger, per spec §3's invariant
/// ("balance == sum(delta) over CreditTransactions for that user, eventually").
pub async fn reconcile(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    let sum: Option<i64> =
        sqlx::query_scalar("SELECT SUM(delta) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(sum.unwrap_or(0))
}

/// Stamp the idempotency key shape used for refills, for callers constructing metadata by hand.
pub fn refill_metadata(order_id: &str) -> JsonValue {
    json!({ "orderId": order_id, "stampedAt": Utc::now() })
}
