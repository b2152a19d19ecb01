use super::ErrorCode;

/// Errors surfaced by [`crate::pool::PoolManager`] and [`crate::browser::worker`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no idle worker available within the queue deadline")]
    PoolExhausted,
    #[error("session for worker {0} is stale (connect/version check failed)")]
    SessionStale(String),
    #[error("worker launch failed after retries")]
    LaunchFailed,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl PoolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PoolError::PoolExhausted => ErrorCode::BrowserBusy,
            PoolError::SessionStale(_) | PoolError::LaunchFailed => ErrorCode::InternalError,
            PoolError::Storage(_) => ErrorCode::InternalError,
        }
    }
}
