//! HTTP mapping of sync failures

use super::types::ErrorResponse;
use crate::core_sync::SyncError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request timed out")]
    Timeout,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Sync(err) => match err {
                SyncError::Validation(_) => StatusCode::BAD_REQUEST,
                SyncError::NotFound(_) => StatusCode::NOT_FOUND,
                SyncError::Forbidden { .. } => StatusCode::FORBIDDEN,
                SyncError::Conflict(_) => StatusCode::CONFLICT,
                SyncError::Transaction(_) => StatusCode::SERVICE_UNAVAILABLE,
                SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Short machine-readable kind for the `error` field
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Timeout => "timeout",
            ApiError::Sync(err) => match err {
                SyncError::Validation(_) => "validation",
                SyncError::NotFound(_) => "not_found",
                SyncError::Forbidden { .. } => "forbidden",
                SyncError::Conflict(_) => "conflict",
                SyncError::Transaction(_) => "transaction",
                SyncError::Internal(_) => "internal",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the log
        let details = match &self {
            ApiError::Sync(SyncError::Internal(reason)) => {
                error!("Internal error: {}", reason);
                None
            }
            other => Some(other.to_string()),
        };

        let body = ErrorResponse {
            error: self.kind().to_string(),
            details,
        };
        let mut response = (status, Json(body)).into_response();

        if matches!(&self, ApiError::Sync(err) if err.is_retryable()) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
