/// Errors surfaced by [`crate::monitoring::Engine`] (spec §4.7 / §7).
#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("monitoring requires an API key to be configured")]
    ConfigError,
    #[error("interval must be between 1 minute and 24 hours")]
    IntervalOutOfRange,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}
