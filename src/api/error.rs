use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::pairing::PairingError;
use crate::services::session::SessionError;
use crate::services::token_issuer::TokenError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    /// Lived once, expired since. Distinct from NotFound so clients can
    /// tell a dead code from a typo.
    Gone(String),

    Conflict(String),

    Unauthorized(String),

    Forbidden(String),

    ValidationError(String),

    UpstreamError(String),

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Gone(msg) => write!(f, "Gone: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::UpstreamError(msg) => write!(f, "Upstream error: {}", msg),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Gone(msg) => (StatusCode::GONE, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::UpstreamError(msg) => {
                tracing::warn!("Analyzer error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Voice analysis service is unavailable".to_string(),
                )
            }
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

impl From<PairingError> for ApiError {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::NotFound => ApiError::NotFound("Pairing code not found".to_string()),
            PairingError::Expired => ApiError::Gone("Pairing code expired".to_string()),
            PairingError::Conflict(msg) => ApiError::Conflict(msg),
            PairingError::Unauthorized => {
                ApiError::Unauthorized("Invalid exchange secret".to_string())
            }
            PairingError::Validation(msg) => ApiError::ValidationError(msg),
            PairingError::Database(msg) => ApiError::DatabaseError(msg),
            PairingError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => {
                ApiError::NotFound("Session not found or closed".to_string())
            }
            SessionError::Conflict(msg) => ApiError::Conflict(msg),
            SessionError::Validation(msg) => ApiError::ValidationError(msg),
            SessionError::Upstream(e) => ApiError::UpstreamError(e.to_string()),
            SessionError::Database(msg) => ApiError::DatabaseError(msg),
            SessionError::Io(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ApiError::Unauthorized("Invalid token".to_string()),
            TokenError::Encoding(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn dependent_not_found(id: i32) -> Self {
        ApiError::NotFound(format!("Dependent {} not found", id))
    }
}
