//! Request Pipeline (spec §4.5): one orchestration path shared by every
//! operation kind -- credit check, cache lookup, pool-backed execution,
//! then a background deduct + cache write that never blocks the response.

pub mod ops;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::{self, ArtifactCache, CacheLookup};
use crate::config::Settings;
use crate::database::error_log;
use crate::errors::{ErrorCode, ErrorDetail};
use crate::errors::pipeline::PipelineError;
use crate::ledger::Ledger;
use crate::models::credit::op_reason;
use crate::models::error_log::ErrorLevel;
use crate::pool::PoolManager;

use ops::{Execution, OpKind, OpParams};

/// Fixed per-operation cost table, spec §4.5 ("the table must be defined in
/// one place and referenced by both pipeline and pricing docs").
pub fn credit_cost(op: OpKind) -> i64 {
    match op {
        OpKind::Screenshot => 1,
        OpKind::Markdown => 1,
        OpKind::Content => 1,
        OpKind::Links => 1,
        OpKind::Pdf => 2,
        OpKind::Scrape => 1,
        OpKind::Search => 1,
        OpKind::JsonExtraction => 2,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub credits_cost: i64,
    pub credits_remaining: i64,
    pub from_cache: bool,
}

impl PipelineResponse {
    fn ok(data: JsonValue, cost: i64, remaining: i64, from_cache: bool) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            credits_cost: cost,
            credits_remaining: remaining,
            from_cache,
        }
    }

    fn err(message: impl Into<String>, code: ErrorCode, cost: i64, remaining: i64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorDetail {
                message: message.into(),
                code,
            }),
            credits_cost: cost,
            credits_remaining: remaining,
            from_cache: false,
        }
    }
}

pub struct Pipeline {
    pool_manager: Arc<PoolManager>,
    ledger: Arc<Ledger>,
    cache: ArtifactCache,
    db: PgPool,
    settings: Settings,
    http: reqwest::Client,
}

impl Pipeline {
    pub fn new(pool_manager: Arc<PoolManager>, ledger: Arc<Ledger>, cache: ArtifactCache, db: PgPool, settings: Settings) -> Self {
        Self {
            pool_manager,
            ledger,
            cache,
            db,
            settings,
            http: reqwest::Client::new(),
        }
    }

    /// `(op, userId, params) -> {success, data|error, creditsCost, creditsRemaining, fromCache}`.
    pub async fn execute(&self, user_id: Uuid, op: OpKind, raw_params: JsonValue) -> PipelineResponse {
        let cost = credit_cost(op);

        let params = match OpParams::from_json(op, raw_params) {
            Ok(p) => p,
            Err(err) => return PipelineResponse::err(err.to_string(), ErrorCode::ValidationError, cost, 0),
        };

        // Step 1: credit check.
        let balance = match self.ledger.get_balance(user_id).await {
            Ok(b) => b.balance,
            Err(err) => {
                return PipelineResponse::err(err.to_string(), err.code(), cost, 0);
            }
        };
        if balance < cost {
            return PipelineResponse::err("insufficient credits", ErrorCode::InsufficientCredits, cost, balance);
        }

        // Step 2: cache lookup (skipped in development mode).
        let cache_key = cache::derive_key(op.as_str(), user_id, &cache::params_without_user_id(params.as_json()));
        if !self.settings.cache_bypass_in_development {
            if let CacheLookup::Hit(body) = self.cache.get(&cache_key).await {
                self.spawn_deduct(user_id, cost, op);
                return PipelineResponse::ok(body, cost, balance.saturating_sub(cost), true);
            }
        }

        // Step 3: execute via pool.
        let (worker_id, result) = match self.run_via_pool(op, &params, user_id).await {
            Ok((worker_id, data)) => (worker_id, Ok(data)),
            Err((worker_id, err)) => (worker_id, Err(err)),
        };

        match result {
            // Step 4: failure -- no deduct, no cache, log.
            Err(err) => {
                if let Some(worker_id) = &worker_id {
                    self.pool_manager
                        .report_status(worker_id, crate::models::worker::WorkerStatus::Error, Some(err.to_string()))
                        .await;
                }
                self.spawn_error_log(user_id, op, err.to_string());
                PipelineResponse::err(err.to_string(), err.code(), cost, balance)
            }
            // Step 5: success -- background deduct + cache write, optimistic response.
            Ok(data) => {
                if let Some(worker_id) = &worker_id {
                    self.pool_manager
                        .report_status(worker_id, crate::models::worker::WorkerStatus::Idle, None)
                        .await;
                }
                self.spawn_deduct(user_id, cost, op);
                self.spawn_cache_write(cache_key, op, user_id, data.clone());
                PipelineResponse::ok(data, cost, balance.saturating_sub(cost), false)
            }
        }
    }

    async fn run_via_pool(
        &self,
        op: OpKind,
        params: &OpParams,
        user_id: Uuid,
    ) -> Result<(Option<String>, JsonValue), (Option<String>, PipelineError)> {
        if !op.needs_browser() {
            let exec = Execution {
                page: None,
                settings: &self.settings,
                http: &self.http,
                user_id,
            };
            return ops::run(exec, params).await.map(|d| (None, d)).map_err(|e| (None, e));
        }

        let (worker_id, _session_id) = self
            .pool_manager
            .acquire()
            .await
            .map_err(|e| (None, PipelineError::from(e)))?;

        let page = match self.pool_manager.open_page(&worker_id).await {
            Ok(p) => p,
            Err(e) => return Err((Some(worker_id), PipelineError::OpFailed(e.to_string()))),
        };

        let exec = Execution {
            page: Some(page.as_ref()),
            settings: &self.settings,
            http: &self.http,
            user_id,
        };

        match ops::run(exec, params).await {
            Ok(data) => Ok((Some(worker_id), data)),
            Err(err) => Err((Some(worker_id), err)),
        }
    }

    fn spawn_deduct(&self, user_id: Uuid, cost: i64, op: OpKind) {
        let ledger = self.ledger.clone();
        let reason = op_reason(op.as_str());
        tokio::spawn(async move {
            if let Err(err) = ledger.deduct(user_id, cost, &reason, None).await {
                tracing::warn!(error = %err, %user_id, "background deduct failed");
            }
        });
    }

    fn spawn_cache_write(&self, key: String, op: OpKind, user_id: Uuid, body: JsonValue) {
        let cache = self.cache.clone();
        let operation = op.as_str().to_string();
        tokio::spawn(async move {
            cache.put(&key, &operation, user_id, &body).await;
        });
    }

    fn spawn_error_log(&self, user_id: Uuid, op: OpKind, message: String) {
        let db = self.db.clone();
        let operation = op.as_str().to_string();
        tokio::spawn(async move {
            let _ = error_log::record(
                &db,
                ErrorLevel::Error,
                "pipeline",
                &operation,
                Some(user_id),
                None,
                &message,
                None,
                serde_json::json!({}),
            )
            .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_cost_covers_every_op() {
        for op in OpKind::ALL {
            assert!(credit_cost(op) > 0);
        }
    }
}
