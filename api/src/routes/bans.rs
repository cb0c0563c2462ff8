use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing::get};
use bastion_core::bans::BanEntry;
use bastion_core::error::ApiError;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_BAN_LIMIT: i64 = 100;
const MAX_BAN_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bans", get(list_bans))
        .route("/v1/admin/bans/{address}", get(get_ban))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListBansParams {
    /// Maximum number of bans (default 100, max 500)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BanListResponse {
    pub bans: Vec<BanEntry>,
}

/// Currently active bans, latest expiry first
#[utoipa::path(
    get,
    path = "/v1/admin/bans",
    params(ListBansParams),
    responses(
        (status = 200, description = "Active bans", body = BanListResponse),
        (status = 500, description = "Storage error", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_bans(
    State(state): State<AppState>,
    Query(params): Query<ListBansParams>,
) -> Result<Json<BanListResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_BAN_LIMIT)
        .clamp(1, MAX_BAN_LIMIT);
    let bans = state.bans.active(Utc::now(), limit).await?;
    Ok(Json(BanListResponse { bans }))
}

/// The active ban on one address
#[utoipa::path(
    get,
    path = "/v1/admin/bans/{address}",
    params(("address" = String, Path, description = "Banned network address")),
    responses(
        (status = 200, description = "Active ban", body = BanEntry),
        (status = 404, description = "No active ban for this address", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn get_ban(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BanEntry>, AppError> {
    match state.bans.find_active(&address, Utc::now()).await? {
        Some(ban) => Ok(Json(ban)),
        None => Err(AppError::NotFound {
            message: format!("No active ban for address '{address}'"),
            field: Some("address".to_string()),
            received: Some(serde_json::Value::String(address)),
        }),
    }
}
