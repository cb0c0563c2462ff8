use std::net::IpAddr;

use axum::Json;
use axum::http::{HeaderValue, Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use bastion_core::error::{ApiError, codes};
use tower_governor::{
    GovernorError, GovernorLayer,
    governor::GovernorConfigBuilder,
    key_extractor::{KeyExtractor, PeerIpKeyExtractor, SmartIpKeyExtractor},
};

type RateLimitLayer =
    GovernorLayer<ClientIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Keys rate limits by the same client identity the defense gate uses: proxy
/// headers only when they are trusted, the socket peer otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ClientIpKeyExtractor {
    trust_forwarded_for: bool,
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let ip = if self.trust_forwarded_for {
            SmartIpKeyExtractor.extract(req)?
        } else {
            PeerIpKeyExtractor.extract(req)?
        };
        Ok(ip.to_canonical())
    }
}

/// Rate limit for the /v1 read surface: 100 requests/minute per IP.
pub fn api_read_layer(trust_forwarded_for: bool) -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_millisecond(600) // 100 per minute
            .burst_size(100)
            .key_extractor(ClientIpKeyExtractor {
                trust_forwarded_for,
            })
            .finish()
            .expect("invalid governor config for api_read"),
    )
    .error_handler(json_error_handler)
}

/// Returns rate-limit rejections in `ApiError` format with a Retry-After header.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (code, None, msg.unwrap_or_default()),
    };

    let body = ApiError {
        error: codes::RATE_LIMITED.to_string(),
        message,
        field: None,
        received: None,
        request_id: uuid::Uuid::now_v7().to_string(),
        docs_hint: None,
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(wait_time) = retry_after
        && let Ok(value) = HeaderValue::from_str(&wait_time.to_string())
    {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}
