use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct TestResult {
    pub id: Uuid,
    pub session_id: Uuid,
    pub endpoint: String,
    pub success: bool,
    pub response_time_ms: i64,
    pub status_code: Option<i32>,
    pub error_message: Option<String>,
    pub response_size: Option<i64>,
    pub credits_cost: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub avg_response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub total_runs: i64,
    pub total_successes: i64,
    pub total_failures: i64,
    pub min_response_time_ms: Option<i64>,
    pub max_response_time_ms: Option<i64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl EndpointStats {
    pub fn fresh(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            total_runs: 0,
            total_successes: 0,
            total_failures: 0,
            min_response_time_ms: None,
            max_response_time_ms: None,
            last_success_at: None,
            last_failure_at: None,
            last_updated: Utc::now(),
        }
    }

    pub fn record(&mut self, success: bool, response_time_ms: i64, at: DateTime<Utc>) {
        self.total_runs += 1;
        if success {
            self.total_successes += 1;
            self.last_success_at = Some(at);
        } else {
            self.total_failures += 1;
            self.last_failure_at = Some(at);
        }
        self.min_response_time_ms = Some(
            self.min_response_time_ms
                .map_or(response_time_ms, |m| m.min(response_time_ms)),
        );
        self.max_response_time_ms = Some(
            self.max_response_time_ms
                .map_or(response_time_ms, |m| m.max(response_time_ms)),
        );
        self.last_updated = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_totals_track_min_max() {
        let mut s = EndpointStats::fresh("links");
        let t0 = Utc::now();
        s.record(true, 120, t0);
        s.record(false, 40, t0);
        s.record(true, 900, t0);
        assert_eq!(s.total_runs, 3);
        assert_eq!(s.total_successes, 2);
        assert_eq!(s.total_failures, 1);
        assert_eq!(s.min_response_time_ms, Some(40));
        assert_eq!(s.max_response_time_ms, Some(900));
    }
}
