//! Error fingerprinting, per spec §3: normalize a message by replacing
//! timestamps, UUIDs, durations and pure numbers with canonical tokens, then
//! lowercase and join with operation and error code so repeat occurrences of
//! the "same" error collapse to one row.

use once_cell::sync::Lazy;
use regex::Regex;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap()
});
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(\.\d+)?\s?(ms|s|sec|secs|seconds|m|min|minutes|h|hours)\b").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").unwrap());

fn normalize(message: &str) -> String {
    let s = TIMESTAMP_RE.replace_all(message, "<ts>");
    let s = UUID_RE.replace_all(&s, "<uuid>");
    let s = URL_RE.replace_all(&s, "<url>");
    let s = DURATION_RE.replace_all(&s, "<duration>");
    let s = NUMBER_RE.replace_all(&s, "<n>");
    s.to_lowercase()
}

/// Compute the stable fingerprint used to deduplicate [`crate::models::error_log::ErrorLog`] rows.
pub fn compute(message: &str, operation: &str, error_code: Option<&str>) -> String {
    let normalized = normalize(message);
    match error_code {
        Some(code) => format!("{operation}:{code}:{normalized}"),
        None => format!("{operation}:{normalized}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_timestamps_and_uuids() {
        let a = compute(
            "request 123e4567-e89b-12d3-a456-426614174000 timed out at 2026-07-31T10:00:00Z after 1500ms",
            "screenshot",
            Some("timeout"),
        );
        let b = compute(
            "request 00000000-0000-0000-0000-000000000000 timed out at 2026-08-01T11:30:05Z after 2300ms",
            "screenshot",
            Some("timeout"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn distinguishes_operations() {
        let a = compute("connection refused", "links", None);
        let b = compute("connection refused", "pdf", None);
        assert_ne!(a, b);
    }

    #[test]
    fn collapses_urls_and_plain_numbers() {
        let a = compute("failed to fetch https://a.example.com/x after 3 attempts", "scrape", None);
        let b = compute("failed to fetch https://b.example.org/y after 7 attempts", "scrape", None);
        assert_eq!(a, b);
    }
}
