//! HTTP error mapping.
//!
//! Every failure a handler or interceptor can produce ends up here. The
//! client sees a coarse kind; detail stays in the server log.

use crate::auth::service::AuthError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("user already exists")]
    AlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Missing or unusable bearer token, whatever the reason
    #[error("unauthorized")]
    Unauthorized,
    #[error("too many requests")]
    RateLimited { retry_after: Duration },
    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::AlreadyExists => StatusCode::CONFLICT,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AlreadyExists => ApiError::AlreadyExists,
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::Hashing(e) => ApiError::Internal(e.into()),
            AuthError::Storage(e) => ApiError::Internal(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Internal(e) => {
                error!(error = ?e, "Request failed with internal error");
                (status, Json(json!({ "error": "internal server error" }))).into_response()
            }
            ApiError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs();
                (
                    status,
                    [(header::RETRY_AFTER, secs.to_string())],
                    Json(json!({
                        "error": "Too many requests. Please try again later.",
                        "retry_after_seconds": secs,
                    })),
                )
                    .into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
