use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use bastion_core::requests::{RequestCategory, RequestLogEntry};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: i64 = 50;
const MAX_RECENT_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/analytics/requests", get(request_stats))
        .route("/v1/analytics/requests/recent", get(recent_requests))
}

/// Reporting window for request statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Day,
    Week,
    Month,
}

impl TimeRange {
    /// Unknown or missing values fall back to the last 24 hours.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("7d") => TimeRange::Week,
            Some("30d") => TimeRange::Month,
            _ => TimeRange::Day,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            TimeRange::Day => Duration::hours(24),
            TimeRange::Week => Duration::days(7),
            TimeRange::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RequestStatsParams {
    /// One of `24h`, `7d`, `30d` (default `24h`)
    #[serde(default, alias = "timeRange")]
    pub time_range: Option<String>,
}

#[derive(Debug, Default, Serialize, utoipa::ToSchema)]
pub struct CategoryTotals {
    pub normal: i64,
    pub warning: i64,
    pub anomaly: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RequestStatsResponse {
    pub time_range: String,
    pub categories: CategoryTotals,
    pub total: i64,
}

/// Request counts per category over a time window
#[utoipa::path(
    get,
    path = "/v1/analytics/requests",
    params(RequestStatsParams),
    responses(
        (status = 200, description = "Category counts", body = RequestStatsResponse),
        (status = 500, description = "Storage error", body = bastion_core::error::ApiError)
    ),
    tag = "analytics"
)]
pub async fn request_stats(
    State(state): State<AppState>,
    Query(params): Query<RequestStatsParams>,
) -> Result<Json<RequestStatsResponse>, AppError> {
    let range = TimeRange::parse_lenient(params.time_range.as_deref());
    let counts = state
        .logs
        .category_counts(Utc::now() - range.duration())
        .await?;

    let mut categories = CategoryTotals::default();
    for count in counts {
        match count.category {
            RequestCategory::Normal => categories.normal += count.count,
            RequestCategory::Warning => categories.warning += count.count,
            RequestCategory::Anomaly => categories.anomaly += count.count,
        }
    }
    let total = categories.normal + categories.warning + categories.anomaly;

    Ok(Json(RequestStatsResponse {
        time_range: range.as_str().to_string(),
        categories,
        total,
    }))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RecentRequestsParams {
    /// Maximum number of entries (default 50, max 500)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecentRequestsResponse {
    pub requests: Vec<RequestLogEntry>,
}

/// Most recent request log entries, newest first
#[utoipa::path(
    get,
    path = "/v1/analytics/requests/recent",
    params(RecentRequestsParams),
    responses(
        (status = 200, description = "Recent request log entries", body = RecentRequestsResponse),
        (status = 500, description = "Storage error", body = bastion_core::error::ApiError)
    ),
    tag = "analytics"
)]
pub async fn recent_requests(
    State(state): State<AppState>,
    Query(params): Query<RecentRequestsParams>,
) -> Result<Json<RecentRequestsResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    let requests = state.logs.recent(limit).await?;
    Ok(Json(RecentRequestsResponse { requests }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RequestLogStore;
    use crate::test_support::{get_request, json_body, memory_state, unused_base_url};
    use axum::http::StatusCode;
    use bastion_core::requests::RequestRecord;
    use tower::ServiceExt;

    fn record(category: RequestCategory, age: Duration) -> RequestRecord {
        RequestRecord {
            address: "203.0.113.9".to_string(),
            method: "GET".to_string(),
            path: "/api/cart".to_string(),
            status_code: 200,
            user_agent: "test-agent".to_string(),
            category,
            response_time_ms: 12.0,
            created_at: Utc::now() - age,
        }
    }

    #[test]
    fn unknown_time_range_defaults_to_a_day() {
        assert_eq!(TimeRange::parse_lenient(None), TimeRange::Day);
        assert_eq!(TimeRange::parse_lenient(Some("1y")), TimeRange::Day);
        assert_eq!(TimeRange::parse_lenient(Some("7d")), TimeRange::Week);
        assert_eq!(TimeRange::parse_lenient(Some("30d")).as_str(), "30d");
    }

    #[tokio::test]
    async fn stats_count_each_category_inside_the_window() {
        let (state, _, logs) = memory_state(unused_base_url().await);
        for (category, age) in [
            (RequestCategory::Normal, Duration::hours(1)),
            (RequestCategory::Normal, Duration::hours(2)),
            (RequestCategory::Warning, Duration::hours(3)),
            (RequestCategory::Anomaly, Duration::hours(4)),
            (RequestCategory::Anomaly, Duration::days(3)),
        ] {
            logs.append(&record(category, age)).await.expect("append");
        }
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(get_request("/v1/analytics/requests"))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["time_range"], "24h");
        assert_eq!(body["categories"]["normal"], 2);
        assert_eq!(body["categories"]["warning"], 1);
        assert_eq!(body["categories"]["anomaly"], 1);
        assert_eq!(body["total"], 4);

        let response = app
            .oneshot(get_request("/v1/analytics/requests?time_range=7d"))
            .await
            .expect("request should succeed");
        let body = json_body(response).await;
        assert_eq!(body["time_range"], "7d");
        assert_eq!(body["categories"]["anomaly"], 2);
        assert_eq!(body["total"], 5);
    }

    #[tokio::test]
    async fn camel_case_time_range_is_accepted() {
        let (state, _, logs) = memory_state(unused_base_url().await);
        logs.append(&record(RequestCategory::Anomaly, Duration::days(3)))
            .await
            .expect("append");
        let app = router().with_state(state);

        let response = app
            .oneshot(get_request("/v1/analytics/requests?timeRange=7d"))
            .await
            .expect("request should succeed");
        let body = json_body(response).await;
        assert_eq!(body["time_range"], "7d");
        assert_eq!(body["categories"]["anomaly"], 1);
    }

    #[tokio::test]
    async fn recent_clamps_limit_and_returns_newest_first() {
        let (state, _, logs) = memory_state(unused_base_url().await);
        logs.append(&record(RequestCategory::Normal, Duration::minutes(5)))
            .await
            .expect("append");
        logs.append(&record(RequestCategory::Anomaly, Duration::minutes(1)))
            .await
            .expect("append");
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(get_request("/v1/analytics/requests/recent?limit=0"))
            .await
            .expect("request should succeed");
        let body = json_body(response).await;
        let requests = body["requests"].as_array().expect("array");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["category"], "anomaly");
        assert_eq!(requests[0]["address"], "203.0.113.9");

        let response = app
            .oneshot(get_request("/v1/analytics/requests/recent"))
            .await
            .expect("request should succeed");
        let body = json_body(response).await;
        assert_eq!(body["requests"].as_array().expect("array").len(), 2);
    }
}
