pub mod fingerprint;
pub mod ledger;
pub mod monitoring;
pub mod pipeline;
pub mod pool;

use std::fmt;

use actix_web::http::StatusCode;
use serde::Serialize;

/// Wire-level error code, per the external-interfaces error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InsufficientCredits,
    ValidationError,
    AuthRequired,
    NotFound,
    RateLimited,
    InternalError,
    BrowserBusy,
    Timeout,
    ExtractionFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: ErrorCode,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                message: message.into(),
                code,
            },
        }
    }
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::BrowserBusy => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::ExtractionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Wraps any handler-facing failure that never reached the pipeline (bad
/// auth, malformed JSON body, a not-found route param) in the same wire
/// envelope a pipeline failure would produce.
#[derive(Debug)]
pub struct ApiError(pub ErrorDetail);

impl ApiError {
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        Self(ErrorDetail {
            message: message.into(),
            code,
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.message)
    }
}

impl std::error::Error for ApiError {}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.0.code.status_code()
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(self.status_code())
            .json(ErrorEnvelope::new(self.0.message.clone(), self.0.code))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::new(err.to_string(), ErrorCode::InternalError)
    }
}

impl From<monitoring::MonitoringError> for ApiError {
    fn from(err: monitoring::MonitoringError) -> Self {
        let code = match err {
            monitoring::MonitoringError::ConfigError => ErrorCode::ValidationError,
            monitoring::MonitoringError::IntervalOutOfRange => ErrorCode::ValidationError,
            monitoring::MonitoringError::Storage(_) => ErrorCode::InternalError,
        };
        ApiError::new(err.to_string(), code)
    }
}
