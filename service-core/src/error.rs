use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Locked: {0}")]
    Locked(anyhow::Error),

    #[error("Precondition required: {0}")]
    PreconditionRequired(anyhow::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

/// Wire-friendly error envelope. Internal detail is redacted before it
/// reaches a client.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status an embedding transport should map this error onto.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::Conflict(_) => 409,
            AppError::Locked(_) => 423,
            AppError::PreconditionRequired(_) => 428,
            AppError::PreconditionFailed(_) => 412,
            AppError::InternalError(_) => 500,
            AppError::ServiceUnavailable => 503,
            AppError::ConfigError(_) => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            AppError::BadRequest(err) => (err.to_string(), None),
            AppError::NotFound(err) => (err.to_string(), None),
            AppError::Unauthorized(err) => (err.to_string(), None),
            AppError::Forbidden(err) => (err.to_string(), None),
            AppError::Conflict(err) => (err.to_string(), None),
            AppError::Locked(err) => (err.to_string(), None),
            AppError::PreconditionRequired(err) => (err.to_string(), None),
            AppError::PreconditionFailed(err) => (err.to_string(), None),
            AppError::InternalError(_) => ("Internal server error".to_string(), None),
            AppError::ServiceUnavailable => ("Service unavailable".to_string(), None),
            AppError::ConfigError(err) => {
                ("Configuration error".to_string(), Some(err.to_string()))
            }
        };

        ErrorBody { error, details }
    }
}
