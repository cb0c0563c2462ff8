use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use bastion_core::error::ApiError;
use serde::Serialize;

use crate::HealthResponse;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/v1/admin/classifier/health", get(classifier_health))
}

/// Health check endpoint: verifies both API and request-log storage are operational
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = match state.logs.ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "storage health check failed");
            false
        }
    };

    let (http_status, status) = if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ClassifierHealthResponse {
    pub status: String,
    /// Base URL of the anomaly classifier that was probed
    pub service_url: String,
    /// Whether the local fallback rules answer when the classifier is down
    pub fallback_enabled: bool,
}

/// Probe the anomaly classifier's own health endpoint
#[utoipa::path(
    get,
    path = "/v1/admin/classifier/health",
    responses(
        (status = 200, description = "Classifier is reachable", body = ClassifierHealthResponse),
        (status = 503, description = "Classifier is unreachable", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn classifier_health(
    State(state): State<AppState>,
) -> Result<Json<ClassifierHealthResponse>, AppError> {
    state
        .classifier
        .health()
        .await
        .map_err(|err| AppError::Unavailable {
            message: err.to_string(),
        })?;

    let config = state.classifier.config();
    Ok(Json(ClassifierHealthResponse {
        status: "ok".to_string(),
        service_url: config.base_url.to_string(),
        fallback_enabled: config.fallback_enabled,
    }))
}
