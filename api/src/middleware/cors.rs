use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

const DEFAULT_ORIGINS: &str = "http://localhost:3000";

/// Build a CORS layer from the `BASTION_CORS_ORIGINS` env var.
///
/// - Origins: comma-separated list (default: `http://localhost:3000`)
/// - Methods: GET, OPTIONS (the API surface is read-only)
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    let origins = std::env::var("BASTION_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.into());
    cors_layer_for(&origins)
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}

fn cors_layer_for(raw: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(parse_origins(raw))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type")])
        .max_age(std::time::Duration::from_secs(3600))
}
