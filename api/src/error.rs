use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bastion_core::error::{ApiError, codes};

use crate::store::StoreError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Resource does not exist (404)
    NotFound {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
    },
    /// Storage error (500)
    Store(StoreError),
    /// A dependency is down (503)
    Unavailable { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::NotFound {
                message,
                field,
                received,
            } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: codes::NOT_FOUND.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Unavailable { message } => {
                tracing::warn!(message = %message, "dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiError {
                        error: codes::SERVICE_UNAVAILABLE.to_string(),
                        message,
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some("Retry later.".to_string()),
                    },
                )
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}
