use super::ErrorCode;
use super::ledger::LedgerError;
use super::pool::PoolError;

/// Top-level error for a single pipeline operation (spec §4.5 / §7).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("invalid parameters: {0}")]
    Validation(String),
    #[error("navigation exceeded the op budget")]
    NavTimeout,
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("operation failed: {0}")]
    OpFailed(String),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Ledger(e) => e.code(),
            PipelineError::Pool(e) => e.code(),
            PipelineError::Validation(_) => ErrorCode::ValidationError,
            PipelineError::NavTimeout => ErrorCode::Timeout,
            PipelineError::ExtractionFailed(_) => ErrorCode::ExtractionFailed,
            PipelineError::OpFailed(_) => ErrorCode::InternalError,
        }
    }
}
