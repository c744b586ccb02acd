// Common DTOs and error mapping for the public API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlgate_core::SqlGateError;
use utoipa::ToSchema;

/// Error body returned by failing requests
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Handler error carrying a status code and a message
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SqlGateError> for ApiError {
    fn from(err: SqlGateError) -> Self {
        let status = match &err {
            SqlGateError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
            SqlGateError::NotAwaitingApproval { .. } => StatusCode::CONFLICT,
            SqlGateError::DecisionNotAllowed { .. } | SqlGateError::InvalidDecision(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SqlGateError::Llm(_) => StatusCode::BAD_GATEWAY,
            SqlGateError::Store(_)
            | SqlGateError::EventEmission(_)
            | SqlGateError::Configuration(_)
            | SqlGateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        } else {
            tracing::warn!("Request rejected: {}", err);
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
