use super::ErrorCode;

/// Errors surfaced by [`crate::ledger::Ledger`] operations, per spec §4.1.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("no balance row for user")]
    NotFound,
    #[error("a balance row already exists for this user")]
    AlreadyAssigned,
    #[error("balance {balance} is insufficient for amount {amount}")]
    Insufficient { balance: i64, amount: i64 },
    #[error("already applied under this idempotency key")]
    AlreadyApplied,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Insufficient { .. } => ErrorCode::InsufficientCredits,
            LedgerError::NotFound => ErrorCode::NotFound,
            LedgerError::AlreadyAssigned | LedgerError::AlreadyApplied => {
                ErrorCode::ValidationError
            }
            LedgerError::Storage(_) => ErrorCode::InternalError,
        }
    }
}
