use axum::{http::StatusCode, response::Json};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::llm_client::LlmError;

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Upstream(String),

    /// Terminal subtype of an upstream failure: the provider returned a
    /// zero-quota 429, so retrying cannot help.
    #[error(
        "OpenRouter quota/credits are unavailable for this key. Add credits or use a key with access to the configured model."
    )]
    QuotaExhausted,

    #[error("MCQ session expired. Generate study set again.")]
    SessionExpired,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("Unexpected server error: {0}")]
    Internal(String),
}

/// Flat error body, matching the boundary contract: `{ "error": "..." }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::QuotaExhausted => StatusCode::BAD_GATEWAY,
            ApiError::SessionExpired => StatusCode::GONE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert the error to an HTTP response, logging it at a level that
    /// matches its severity: caller mistakes and expired sessions are
    /// routine, upstream and internal failures are not.
    pub fn into_response(self, operation: &str) -> (StatusCode, Json<ErrorBody>) {
        match &self {
            ApiError::BadRequest(_) => {
                warn!(operation = operation, error = %self, "Bad request");
            }
            ApiError::SessionExpired => {
                info!(operation = operation, error = %self, "Session miss");
            }
            ApiError::Upstream(_) | ApiError::QuotaExhausted => {
                error!(operation = operation, error = %self, "Upstream provider failure");
            }
            ApiError::Database(_) | ApiError::Internal(_) => {
                error!(operation = operation, error = %self, "Internal server error");
            }
        }

        (
            self.status_code(),
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::QuotaExhausted => ApiError::QuotaExhausted,
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_error_taxonomy() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Upstream("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::QuotaExhausted.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::SessionExpired.status_code(), StatusCode::GONE);
        assert_eq!(
            ApiError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn quota_errors_stay_terminal_through_conversion() {
        let api: ApiError = LlmError::QuotaExhausted.into();
        assert!(matches!(api, ApiError::QuotaExhausted));

        let api: ApiError = LlmError::EmptyResponse.into();
        assert!(matches!(api, ApiError::Upstream(_)));
    }
}
