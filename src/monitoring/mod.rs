//! Monitoring Engine (spec §4.7): a singleton, alarm-driven actor that
//! periodically exercises the public operation set and records results.
//! Mirrors the browser worker's reschedule-on-wakeup shape, but the control
//! surface (`Start`/`Stop`/`Status`/`Results`/`Stats`/`RunOnce`) is
//! request/response rather than fire-and-forget, so state lives behind one
//! `tokio::sync::Mutex` like the pool manager's registry.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use sqlx::PgPool;
use tracing::warn;

use crate::config::Settings;
use crate::database::monitoring as storage;
use crate::errors::monitoring::MonitoringError;
use crate::models::monitoring::{EndpointStats, TestResult, TestSession};
use crate::pipeline::ops::OpKind;

const MIN_INTERVAL: Duration = Duration::from_secs(60);
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub interval: Duration,
    pub per_test_timeout: Duration,
    pub enabled_endpoints: Vec<OpKind>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            per_test_timeout: Duration::from_secs(30),
            enabled_endpoints: OpKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MonitoringConfigInput {
    pub interval: Option<Duration>,
    pub per_test_timeout: Option<Duration>,
    pub enabled_endpoints: Option<Vec<OpKind>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub active: bool,
    pub interval_ms: u128,
    pub next_test_at: Option<DateTime<Utc>>,
}

struct EngineState {
    active: bool,
    config: MonitoringConfig,
    next_test_at: Option<DateTime<Utc>>,
    /// Bumped on every `Start`/`Stop` so an in-flight alarm timer from a
    /// superseded configuration knows to die instead of rescheduling itself.
    generation: u64,
}

pub struct Engine {
    self_ref: Weak<Engine>,
    state: tokio::sync::Mutex<EngineState>,
    db: PgPool,
    settings: Settings,
    http: reqwest::Client,
}

impl Engine {
    pub fn new(settings: Settings, db: PgPool) -> Arc<Self> {
        Arc::new_cyclic(|weak| Engine {
            self_ref: weak.clone(),
            state: tokio::sync::Mutex::new(EngineState {
                active: false,
                config: MonitoringConfig::default(),
                next_test_at: None,
                generation: 0,
            }),
            db,
            settings,
            http: reqwest::Client::new(),
        })
    }

    /// `Start(config)` -- spec §4.7.
    pub async fn start(self: &Arc<Self>, input: MonitoringConfigInput) -> Result<(), MonitoringError> {
        if self.settings.monitoring_api_key.is_none() {
            return Err(MonitoringError::ConfigError);
        }

        let mut config = MonitoringConfig::default();
        if let Some(interval) = input.interval {
            if interval < MIN_INTERVAL || interval > MAX_INTERVAL {
                return Err(MonitoringError::IntervalOutOfRange);
            }
            config.interval = interval;
        }
        if let Some(timeout) = input.per_test_timeout {
            config.per_test_timeout = timeout;
        }
        if let Some(endpoints) = input.enabled_endpoints {
            config.enabled_endpoints = endpoints;
        }

        let (generation, delay) = {
            let mut state = self.state.lock().await;
            state.active = true;
            state.next_test_at = Some(Utc::now() + chrono_duration(config.interval));
            state.generation += 1;
            state.config = config.clone();
            (state.generation, config.interval)
        };

        self.schedule_alarm(generation, delay);
        Ok(())
    }

    /// `Stop()` -- spec §4.7.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.active = false;
        state.next_test_at = None;
        state.generation += 1;
    }

    /// `Status()` -- spec §4.7.
    pub async fn status(&self) -> StatusView {
        let state = self.state.lock().await;
        StatusView {
            active: state.active,
            interval_ms: state.config.interval.as_millis(),
            next_test_at: state.next_test_at,
        }
    }

    /// `Results(filter)` -- spec §4.7.
    pub async fn results(&self, filter: storage::ResultsFilter) -> sqlx::Result<Vec<TestResult>> {
        storage::query_results(&self.db, &filter).await
    }

    /// `Stats()` -- spec §4.7.
    pub async fn stats(&self) -> sqlx::Result<Vec<EndpointStats>> {
        storage::all_endpoint_stats(&self.db).await
    }

    /// `RunOnce()` -- spec §4.7: executes a single cycle immediately,
    /// independent of whether the engine is active.
    pub async fn run_once(&self) -> sqlx::Result<TestSession> {
        let config = self.state.lock().await.config.clone();
        self.run_cycle(&config).await
    }

    fn schedule_alarm(self: &Arc<Self>, generation: u64, delay: Duration) {
        let me = self.self_ref.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = me.upgrade() {
                engine.alarm(generation).await;
            }
        });
    }

    /// Alarm handler -- spec §4.7: "If inactive, return. Otherwise run one
    /// cycle and reschedule now + intervalMs, even on failure."
    async fn alarm(self: Arc<Self>, generation: u64) {
        let config = {
            let state = self.state.lock().await;
            if !state.active || state.generation != generation {
                return;
            }
            state.config.clone()
        };

        if let Err(err) = self.run_cycle(&config).await {
            warn!(error = %err, "monitoring cycle failed");
        }

        let (still_active, next_delay) = {
            let mut state = self.state.lock().await;
            if !state.active || state.generation != generation {
                return;
            }
            state.next_test_at = Some(Utc::now() + chrono_duration(state.config.interval));
            (state.active, state.config.interval)
        };

        if still_active {
            self.schedule_alarm(generation, next_delay);
        }
    }

    async fn run_cycle(&self, config: &MonitoringConfig) -> sqlx::Result<TestSession> {
        let session = storage::start_session(&self.db).await?;
        let mut succeeded = 0i32;
        let mut failed = 0i32;
        let mut total_time_ms: i64 = 0;

        for op in &config.enabled_endpoints {
            let outcome = self.probe_endpoint(*op, config.per_test_timeout).await;
            total_time_ms += outcome.response_time_ms;
            if outcome.success {
                succeeded += 1;
            } else {
                failed += 1;
            }

            storage::insert_result(
                &self.db,
                session.id,
                op.as_str(),
                outcome.success,
                outcome.response_time_ms,
                outcome.status_code,
                outcome.error_message.as_deref(),
                outcome.response_size,
                None,
            )
            .await?;

            let mut stats = storage::fetch_endpoint_stats(&self.db, op.as_str())
                .await?
                .unwrap_or_else(|| EndpointStats::fresh(op.as_str()));
            stats.record(outcome.success, outcome.response_time_ms, Utc::now());
            storage::upsert_endpoint_stats(&self.db, &stats).await?;
        }

        let total = succeeded + failed;
        let avg = if total > 0 {
            Some(total_time_ms as f64 / total as f64)
        } else {
            None
        };
        storage::finish_session(&self.db, session.id, total, succeeded, failed, avg).await?;
        Ok(session)
    }

    async fn probe_endpoint(&self, op: OpKind, timeout: Duration) -> ProbeOutcome {
        let Some(base_url) = self.settings.monitoring_api_base_url.as_deref() else {
            return ProbeOutcome::failure("monitoring base URL is not configured");
        };
        let key = self.settings.monitoring_api_key.as_deref().unwrap_or_default();
        let payload = canonical_payload(op);

        let started = std::time::Instant::now();
        let result = self
            .http
            .post(format!("{base_url}/{}", op.as_str()))
            .bearer_auth(key)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(response) => {
                let status = response.status();
                let size = response.content_length().map(|n| n as i64);
                ProbeOutcome {
                    success: status.is_success(),
                    response_time_ms: elapsed_ms,
                    status_code: Some(status.as_u16() as i32),
                    error_message: if status.is_success() {
                        None
                    } else {
                        Some(format!("HTTP {status}"))
                    },
                    response_size: size,
                }
            }
            Err(err) => ProbeOutcome {
                success: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some(err.to_string()),
                response_size: None,
            },
        }
    }
}

struct ProbeOutcome {
    success: bool,
    response_time_ms: i64,
    status_code: Option<i32>,
    error_message: Option<String>,
    response_size: Option<i64>,
}

impl ProbeOutcome {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            response_time_ms: 0,
            status_code: None,
            error_message: Some(message.to_string()),
            response_size: None,
        }
    }
}

/// Fixed synthetic payload per endpoint, spec §4.7 ("synthesize a canonical
/// test payload, fixed table by operation").
fn canonical_payload(op: OpKind) -> JsonValue {
    match op {
        OpKind::Search => json!({ "query": "rust programming language", "limit": 1 }),
        OpKind::Scrape => json!({
            "url": "https://example.com",
            "elements": [{ "selector": "h1" }],
        }),
        _ => json!({ "url": "https://example.com" }),
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_default()
}
