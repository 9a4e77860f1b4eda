//! API error type for the academic advisor HTTP surface.
//!
//! Wraps `advisor_core::error::Error` and maps each variant onto the HTTP
//! status and body shape from the error-handling design: `422` for
//! validation, `404` for not-found, `409` for a lost CAS race, `503` for
//! unavailable/timeout collaborators, `500` for everything else.
//! `ClientDisconnect` never reaches a handler return path and has no
//! response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Core(#[from] advisor_core::error::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error response body surfaced to API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone()),
            ApiError::Serialization(e) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", e.to_string()),
            ApiError::Core(err) => match err {
                advisor_core::error::Error::Validation(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, err.code(), msg.clone())
                }
                advisor_core::error::Error::NotFound(msg) => (StatusCode::NOT_FOUND, err.code(), msg.clone()),
                advisor_core::error::Error::CasConflict(msg) => (StatusCode::CONFLICT, err.code(), msg.clone()),
                advisor_core::error::Error::UpstreamUnavailable { .. } | advisor_core::error::Error::UpstreamTimeout { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, err.code(), err.to_string())
                }
                advisor_core::error::Error::SchemaEnforce { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.code(), err.to_string())
                }
                advisor_core::error::Error::ClientDisconnect => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.code(), err.to_string())
                }
                advisor_core::error::Error::Internal(msg) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.code(), msg.clone())
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, err.code(), err.to_string()),
            },
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
        }

        let body = Json(ErrorResponse { error: message, code: code.to_string(), status: status.as_u16() });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::Core(advisor_core::error::Error::NotFound("grades:CS 9999".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_422() {
        let err = ApiError::InvalidRequest("message is required".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn upstream_unavailable_maps_to_503() {
        let err = ApiError::Core(advisor_core::error::Error::UpstreamUnavailable {
            service: "redis".to_string(),
            detail: "connection refused".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
