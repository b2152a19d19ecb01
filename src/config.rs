//! Typed configuration loaded from the environment.
//!
//! Every knob documented in the spec's external-interfaces table lives here.
//! Invalid values fall back silently to the documented default rather than
//! failing startup -- this mirrors how the ledger constants are meant to be
//! parsed.

use std::env;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_workers: usize,
    pub queue_max_wait: Duration,
    pub browser_creation_delay: Duration,
    pub health_check_interval: Duration,
    pub refresh_threshold: Duration,
    pub polite_cleanup_timeout: Duration,

    pub initial_free_credits: i64,
    pub initial_pro_credits: i64,
    pub monthly_pro_refill: i64,

    pub cache_bypass_in_development: bool,

    pub search_api_url: Option<String>,
    pub search_api_secret: Option<String>,
    pub gemini_api_key: Option<String>,
    pub cloudflare_ai_model: Option<String>,

    pub monitoring_api_base_url: Option<String>,
    pub monitoring_api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            max_workers: env_usize("MAX_WORKERS", 10),
            queue_max_wait: Duration::from_millis(env_u64("QUEUE_MAX_WAIT_MS", 15_000)),
            browser_creation_delay: Duration::from_millis(env_u64(
                "BROWSER_CREATION_DELAY_MS",
                5_000,
            )),
            health_check_interval: Duration::from_millis(env_u64(
                "HEALTH_CHECK_INTERVAL_MS",
                180_000,
            )),
            refresh_threshold: Duration::from_millis(env_u64("REFRESH_THRESHOLD_MS", 510_000)),
            polite_cleanup_timeout: Duration::from_millis(env_u64(
                "POLITE_CLEANUP_TIMEOUT_MS",
                35_000,
            )),
            initial_free_credits: env_i64("INITIAL_FREE_CREDITS", 1000),
            initial_pro_credits: env_i64("INITIAL_PRO_CREDITS", 5000),
            monthly_pro_refill: env_i64("MONTHLY_PRO_REFILL", 5000),
            cache_bypass_in_development: env::var("CACHE_BYPASS_IN_DEVELOPMENT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            search_api_url: env::var("WEBLINQ_SEARCH_API_URL").ok(),
            search_api_secret: env::var("WEBLINQ_SEARCH_SECRET").ok(),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            cloudflare_ai_model: env::var("CLOUDFLARE_AI_MODEL").ok(),
            monitoring_api_base_url: env::var("WEBLINQ_MONITORING_BASE_URL").ok(),
            monitoring_api_key: env::var("WEBLINQ_MONITORING_API_KEY").ok(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe {
            env::remove_var("MAX_WORKERS");
        }
        let s = Settings::from_env();
        assert_eq!(s.max_workers, 10);
        assert_eq!(s.initial_free_credits, 1000);
        assert_eq!(s.initial_pro_credits, 5000);
        assert_eq!(s.monthly_pro_refill, 5000);
    }

    #[test]
    fn invalid_value_falls_back_to_default() {
        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe {
            env::set_var("MAX_WORKERS", "not-a-number");
        }
        let s = Settings::from_env();
        assert_eq!(s.max_workers, 10);
        unsafe {
            env::remove_var("MAX_WORKERS");
        }
    }
}
