use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Json;
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bastion_core::bans::{ANOMALY_BAN_REASON, BanEntry};
use bastion_core::error::{ApiError, codes};
use bastion_core::features::{RequestContext, extract_features};
use bastion_core::requests::{RequestCategory, RequestRecord, Verdict};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use uuid::Uuid;

use crate::classifier::ClassifierClient;
use crate::config::DefenseConfig;
use crate::store::{BanInsertOutcome, BanStore, RequestLogStore};

/// Paths that never enter the pipeline.
const BYPASS_PATHS: &[&str] = &["/health", "/favicon.ico", "/robots.txt"];

const UNKNOWN_ADDRESS: &str = "unknown";
pub const CATEGORY_HEADER: &str = "x-bastion-category";
pub const BANNED_UNTIL_HEADER: &str = "x-bastion-banned-until";

/// Everything the per-request defense stages need, built once at startup.
pub struct DefensePipeline {
    bans: Arc<dyn BanStore>,
    logs: Arc<dyn RequestLogStore>,
    classifier: Arc<ClassifierClient>,
    config: DefenseConfig,
}

/// What the pipeline observed about a request that made it past the gate.
#[derive(Debug, Clone)]
struct ObservedRequest {
    address: String,
    method: String,
    path: String,
    user_agent: String,
    status_code: u16,
    started: Instant,
}

impl DefensePipeline {
    pub fn new(
        bans: Arc<dyn BanStore>,
        logs: Arc<dyn RequestLogStore>,
        classifier: Arc<ClassifierClient>,
        config: DefenseConfig,
    ) -> Self {
        Self {
            bans,
            logs,
            classifier,
            config,
        }
    }

    /// Expiry of the active ban on `address`. Lookup failures fail open.
    async fn gate(&self, address: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.bans.is_banned(address, now).await {
            Ok(banned_until) => banned_until,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    address = %address,
                    "ban lookup failed; letting request through"
                );
                None
            }
        }
    }

    /// Extract, classify, act, persist. Never fails: every degraded path ends in a
    /// category.
    async fn assess(self: Arc<Self>, observed: ObservedRequest) -> RequestCategory {
        let features = extract_features(&RequestContext {
            address: &observed.address,
            method: &observed.method,
            path: &observed.path,
            status_code: observed.status_code,
            elapsed: observed.started.elapsed(),
        });

        let verdict = match self.classifier.classify(&features).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    address = %observed.address,
                    "anomaly classification failed; treating request as normal"
                );
                Verdict::Normal
            }
        };
        let category = RequestCategory::from(verdict);

        if verdict.is_anomalous() {
            self.ban(&observed.address).await;
        }

        self.persist(RequestRecord {
            address: observed.address,
            method: observed.method,
            path: observed.path,
            status_code: observed.status_code,
            user_agent: observed.user_agent,
            category,
            response_time_ms: features.response_time_ms(),
            created_at: Utc::now(),
        });

        category
    }

    async fn ban(&self, address: &str) {
        let ban = BanEntry::new(
            address,
            Utc::now(),
            self.config.ban_duration,
            ANOMALY_BAN_REASON,
        );
        match self.bans.insert_if_absent(&ban).await {
            Ok(BanInsertOutcome::Inserted) => {
                tracing::info!(
                    address = %address,
                    banned_until = %ban.banned_until,
                    "banned address after anomalous request"
                );
            }
            Ok(BanInsertOutcome::AlreadyBanned) => {
                tracing::debug!(address = %address, "address already banned");
            }
            Err(err) => {
                tracing::warn!(error = %err, address = %address, "failed to store ban");
            }
        }
    }

    /// Fire-and-forget: the response never waits on the log write.
    fn persist(&self, record: RequestRecord) {
        let logs = self.logs.clone();
        tokio::spawn(async move {
            if let Err(err) = logs.append(&record).await {
                tracing::warn!(
                    error = %err,
                    address = %record.address,
                    category = %record.category,
                    "failed to persist request log"
                );
            }
        });
    }
}

/// Tower Layer applying the request defense pipeline to every route.
///
/// Gate runs before the inner service; classification, banning and logging run
/// after it, in a spawned task so a client hanging up cannot cut them short.
#[derive(Clone)]
pub struct DefenseLayer {
    pipeline: Arc<DefensePipeline>,
}

impl DefenseLayer {
    pub fn new(pipeline: Arc<DefensePipeline>) -> Self {
        Self { pipeline }
    }
}

impl<S> Layer<S> for DefenseLayer {
    type Service = DefenseService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefenseService {
            inner,
            pipeline: self.pipeline.clone(),
        }
    }
}

#[derive(Clone)]
pub struct DefenseService<S> {
    inner: S,
    pipeline: Arc<DefensePipeline>,
}

impl<S> Service<Request> for DefenseService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pipeline = self.pipeline.clone();

        Box::pin(async move {
            let path = req.uri().path().to_owned();
            if BYPASS_PATHS.contains(&path.as_str()) {
                return Ok(ready.oneshot(req).await.into_response());
            }

            let started = Instant::now();
            let address = resolve_client_address(&req, pipeline.config.trust_forwarded_for);

            if let Some(banned_until) = pipeline.gate(&address, Utc::now()).await {
                tracing::info!(
                    address = %address,
                    path = %path,
                    banned_until = %banned_until,
                    "rejected request from banned address"
                );
                return Ok(build_ban_response(&address, banned_until));
            }

            let method = req.method().to_string();
            let user_agent = req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let mut response = ready.oneshot(req).await.into_response();

            let observed = ObservedRequest {
                address,
                method,
                path,
                user_agent,
                status_code: response.status().as_u16(),
                started,
            };
            let category = match tokio::spawn(pipeline.assess(observed)).await {
                Ok(category) => category,
                Err(err) => {
                    tracing::error!(error = %err, "defense pipeline task failed");
                    RequestCategory::Normal
                }
            };

            response.headers_mut().insert(
                CATEGORY_HEADER,
                HeaderValue::from_static(category.as_str()),
            );
            Ok(response)
        })
    }
}

/// First `X-Forwarded-For` hop when trusted, otherwise the socket peer.
fn resolve_client_address(req: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for
        && let Some(forwarded) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    {
        return forwarded.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

fn build_ban_response(address: &str, banned_until: DateTime<Utc>) -> Response {
    let body = ApiError {
        error: codes::FORBIDDEN.to_string(),
        message: "Requests from this address are temporarily blocked.".to_string(),
        field: Some("address".to_string()),
        received: Some(json!({
            "address": address,
            "banned_until": banned_until,
        })),
        request_id: Uuid::now_v7().to_string(),
        docs_hint: Some("Retry after the ban expires.".to_string()),
    };

    let mut response = (StatusCode::FORBIDDEN, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&banned_until.to_rfc3339()) {
        response.headers_mut().insert(BANNED_UNTIL_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::extract::State;
    use axum::http::Request as HttpRequest;
    use axum::routing::{get, post};
    use bastion_core::fallback::FallbackRules;
    use bastion_core::requests::RequestLogEntry;
    use serde_json::Value;
    use tokio::sync::{Barrier, Mutex};
    use url::Url;

    use super::*;
    use crate::config::ClassifierConfig;
    use crate::store::{CategoryCount, MemoryBanStore, MemoryRequestLogStore, StoreError};
    use crate::test_support::{spawn_server, unused_base_url};

    struct Classifier {
        base_url: Url,
        calls: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    /// Fake classifier answering every request with `prediction`.
    async fn classifier_answering(prediction: Value) -> Classifier {
        let calls = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/analyze/request",
                post(
                    |State((calls, bodies, prediction)): State<(
                        Arc<AtomicUsize>,
                        Arc<Mutex<Vec<Value>>>,
                        Value,
                    )>,
                     Json(body): Json<Value>| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        bodies.lock().await.push(body);
                        Json(json!({ "prediction": prediction }))
                    },
                ),
            )
            .with_state((calls.clone(), bodies.clone(), prediction));
        Classifier {
            base_url: spawn_server(app).await,
            calls,
            bodies,
        }
    }

    /// Fake classifier that accepts requests and never answers in time.
    async fn classifier_hanging() -> Classifier {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/analyze/request",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Json(json!({ "prediction": [1] }))
                }),
            )
            .with_state(calls.clone());
        Classifier {
            base_url: spawn_server(app).await,
            calls,
            bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn classifier_config(base_url: Url) -> ClassifierConfig {
        ClassifierConfig {
            base_url,
            timeout: Duration::from_secs(1),
            max_retries: 3,
            retry_delay: Duration::from_millis(1),
            fallback_enabled: true,
            fallback_rules: FallbackRules::default(),
        }
    }

    fn defense_config() -> DefenseConfig {
        DefenseConfig {
            ban_duration: chrono::Duration::hours(1),
            trust_forwarded_for: true,
            reap_interval: None,
        }
    }

    struct Harness {
        app: Router,
        bans: MemoryBanStore,
        logs: MemoryRequestLogStore,
    }

    fn harness(classifier: ClassifierConfig, config: DefenseConfig) -> Harness {
        let bans = MemoryBanStore::new();
        let logs = MemoryRequestLogStore::new();
        let pipeline = DefensePipeline::new(
            Arc::new(bans.clone()),
            Arc::new(logs.clone()),
            Arc::new(ClassifierClient::new(classifier).expect("classifier client")),
            config,
        );
        Harness {
            app: app_with(Arc::new(pipeline)),
            bans,
            logs,
        }
    }

    fn app_with(pipeline: Arc<DefensePipeline>) -> Router {
        Router::new()
            .route("/api/products", get(|| async { "products" }))
            .route(
                "/api/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(6)).await;
                    "slow"
                }),
            )
            .route("/health", get(|| async { "ok" }))
            .layer(DefenseLayer::new(pipeline))
    }

    fn request_from(address: &str, uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header("x-forwarded-for", address)
            .header("user-agent", "test-agent")
            .body(Body::empty())
            .expect("request should build")
    }

    async fn wait_for_logs(logs: &MemoryRequestLogStore, expected: usize) -> Vec<RequestLogEntry> {
        for _ in 0..400 {
            let snapshot = logs.snapshot().await;
            if snapshot.len() >= expected {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} request log entries");
    }

    fn category_header(response: &Response) -> &str {
        response
            .headers()
            .get(CATEGORY_HEADER)
            .expect("category header should be set")
            .to_str()
            .expect("category header is ascii")
    }

    #[tokio::test]
    async fn anomalous_prediction_bans_address_and_logs_anomaly() {
        let classifier = classifier_answering(json!([-1])).await;
        let h = harness(classifier_config(classifier.base_url.clone()), defense_config());

        let before = Utc::now();
        let response = h
            .app
            .clone()
            .oneshot(request_from("1.2.3.4", "/api/products"))
            .await
            .expect("request should succeed");
        let after = Utc::now();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(category_header(&response), "anomaly");

        let bans = h.bans.snapshot().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].address, "1.2.3.4");
        assert_eq!(bans[0].reason, ANOMALY_BAN_REASON);
        assert!(bans[0].banned_until >= before + chrono::Duration::hours(1));
        assert!(bans[0].banned_until <= after + chrono::Duration::hours(1));

        let logs = wait_for_logs(&h.logs, 1).await;
        let record = &logs[0].record;
        assert_eq!(record.category, RequestCategory::Anomaly);
        assert_eq!(record.address, "1.2.3.4");
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/api/products");
        assert_eq!(record.status_code, 200);
        assert_eq!(record.user_agent, "test-agent");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_ban_duration_still_bans_and_logs() {
        let classifier = classifier_answering(json!([-1])).await;
        let config = DefenseConfig {
            ban_duration: chrono::Duration::seconds(9_000_000_000_000),
            ..defense_config()
        };
        let h = harness(classifier_config(classifier.base_url.clone()), config);

        let response = h
            .app
            .clone()
            .oneshot(request_from("1.2.3.4", "/api/products"))
            .await
            .expect("request should succeed");

        assert_eq!(category_header(&response), "anomaly");
        let bans = h.bans.snapshot().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].banned_until, DateTime::<Utc>::MAX_UTC);
        let logs = wait_for_logs(&h.logs, 1).await;
        assert_eq!(logs[0].record.category, RequestCategory::Anomaly);
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_timeouts_fall_back_to_rules_for_slow_requests() {
        let classifier = classifier_hanging().await;
        let h = harness(classifier_config(classifier.base_url.clone()), defense_config());

        let response = h
            .app
            .clone()
            .oneshot(request_from("1.2.3.4", "/api/slow"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(category_header(&response), "anomaly");

        let bans = h.bans.snapshot().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].address, "1.2.3.4");

        let logs = wait_for_logs(&h.logs, 1).await;
        assert_eq!(logs[0].record.category, RequestCategory::Anomaly);
        assert!(logs[0].record.response_time_ms >= 6_000.0);
    }

    #[tokio::test]
    async fn banned_address_is_rejected_before_classification() {
        let classifier = classifier_answering(json!([1])).await;
        let h = harness(classifier_config(classifier.base_url.clone()), defense_config());
        let ban = BanEntry::new("1.2.3.4", Utc::now(), chrono::Duration::hours(1), "test ban");
        h.bans.insert_if_absent(&ban).await.expect("seed ban");

        let response = h
            .app
            .clone()
            .oneshot(request_from("1.2.3.4", "/api/products"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response
                .headers()
                .get(BANNED_UNTIL_HEADER)
                .expect("banned-until header"),
            ban.banned_until.to_rfc3339().as_str()
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let body: Value = serde_json::from_slice(&body).expect("body is json");
        assert_eq!(body["error"], codes::FORBIDDEN);
        let banned_until: DateTime<Utc> =
            serde_json::from_value(body["received"]["banned_until"].clone())
                .expect("banned_until is a timestamp");
        assert_eq!(banned_until, ban.banned_until);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert!(h.logs.snapshot().await.is_empty(), "gate rejections are not logged");
    }

    #[tokio::test]
    async fn normal_prediction_logs_without_banning() {
        let classifier = classifier_answering(json!([1])).await;
        let h = harness(classifier_config(classifier.base_url.clone()), defense_config());

        let response = h
            .app
            .clone()
            .oneshot(request_from("8.8.4.4", "/api/products"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(category_header(&response), "normal");
        assert!(h.bans.snapshot().await.is_empty());

        let logs = wait_for_logs(&h.logs, 1).await;
        assert_eq!(logs[0].record.category, RequestCategory::Normal);
    }

    #[tokio::test]
    async fn unparsable_address_encodes_to_zero_and_proceeds() {
        let classifier = classifier_answering(json!([1])).await;
        let h = harness(classifier_config(classifier.base_url.clone()), defense_config());

        let response = h
            .app
            .clone()
            .oneshot(request_from("not-an-ip", "/api/products"))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let bodies = classifier.bodies.lock().await.clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["features"][0][0], json!(0.0));
        assert_eq!(bodies[0]["features"][0][1], json!(1.0));
        assert_eq!(bodies[0]["features"][0][2], json!(13.0));
        assert_eq!(bodies[0]["features"][0][3], json!(200.0));

        let logs = wait_for_logs(&h.logs, 1).await;
        assert_eq!(logs[0].record.address, "not-an-ip");
    }

    #[tokio::test]
    async fn concurrent_anomalies_from_one_address_create_one_ban() {
        // Hold both classifier calls until the second arrives, so both requests are
        // past the gate before either ban is written.
        let barrier = Arc::new(Barrier::new(2));
        let app = Router::new()
            .route(
                "/analyze/request",
                post(|State(barrier): State<Arc<Barrier>>| async move {
                    barrier.wait().await;
                    Json(json!({ "prediction": [-1] }))
                }),
            )
            .with_state(barrier);
        let base_url = spawn_server(app).await;
        let h = harness(classifier_config(base_url), defense_config());

        let (first, second) = tokio::join!(
            h.app.clone().oneshot(request_from("6.6.6.6", "/api/products")),
            h.app.clone().oneshot(request_from("6.6.6.6", "/api/products")),
        );

        for response in [first, second] {
            let response = response.expect("request should succeed");
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(category_header(&response), "anomaly");
        }

        let bans = h.bans.snapshot().await;
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].address, "6.6.6.6");

        let logs = wait_for_logs(&h.logs, 2).await;
        assert_eq!(logs.len(), 2);
        assert!(
            logs.iter()
                .all(|entry| entry.record.category == RequestCategory::Anomaly)
        );
    }

    #[tokio::test]
    async fn unavailable_classifier_without_fallback_degrades_to_normal() {
        let mut config = classifier_config(unused_base_url().await);
        config.fallback_enabled = false;
        config.max_retries = 1;
        let h = harness(config, defense_config());

        let response = h
            .app
            .clone()
            .oneshot(request_from("1.2.3.4", "/api/products"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(category_header(&response), "normal");
        assert!(h.bans.snapshot().await.is_empty());
        let logs = wait_for_logs(&h.logs, 1).await;
        assert_eq!(logs[0].record.category, RequestCategory::Normal);
    }

    #[tokio::test]
    async fn bypassed_paths_skip_the_pipeline() {
        let classifier = classifier_answering(json!([-1])).await;
        let h = harness(classifier_config(classifier.base_url.clone()), defense_config());
        let ban = BanEntry::new("1.2.3.4", Utc::now(), chrono::Duration::hours(1), "test ban");
        h.bans.insert_if_absent(&ban).await.expect("seed ban");

        let response = h
            .app
            .clone()
            .oneshot(request_from("1.2.3.4", "/health"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CATEGORY_HEADER).is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert!(h.logs.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn forwarded_header_is_ignored_unless_trusted() {
        let classifier = classifier_answering(json!([1])).await;
        let mut config = defense_config();
        config.trust_forwarded_for = false;
        let h = harness(classifier_config(classifier.base_url.clone()), config);
        let ban = BanEntry::new("1.2.3.4", Utc::now(), chrono::Duration::hours(1), "test ban");
        h.bans.insert_if_absent(&ban).await.expect("seed ban");

        let request = HttpRequest::builder()
            .uri("/api/products")
            .header("x-forwarded-for", "1.2.3.4")
            .extension(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 41_000))))
            .body(Body::empty())
            .expect("request should build");
        let response = h.app.clone().oneshot(request).await.expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let logs = wait_for_logs(&h.logs, 1).await;
        assert_eq!(logs[0].record.address, "10.0.0.9");
        assert_eq!(logs[0].record.user_agent, "");
    }

    #[test]
    fn forwarded_for_uses_first_hop() {
        let request = HttpRequest::builder()
            .uri("/")
            .header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")
            .body(Body::empty())
            .expect("request should build");
        assert_eq!(resolve_client_address(&request, true), "203.0.113.7");
        assert_eq!(resolve_client_address(&request, false), UNKNOWN_ADDRESS);
    }

    struct OfflineStore;

    fn offline() -> StoreError {
        StoreError::Corrupt("store offline".to_string())
    }

    #[async_trait]
    impl BanStore for OfflineStore {
        async fn is_banned(
            &self,
            _address: &str,
            _now: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>, StoreError> {
            Err(offline())
        }

        async fn find_active(
            &self,
            _address: &str,
            _now: DateTime<Utc>,
        ) -> Result<Option<BanEntry>, StoreError> {
            Err(offline())
        }

        async fn insert_if_absent(&self, _ban: &BanEntry) -> Result<BanInsertOutcome, StoreError> {
            Err(offline())
        }

        async fn active(
            &self,
            _now: DateTime<Utc>,
            _limit: i64,
        ) -> Result<Vec<BanEntry>, StoreError> {
            Err(offline())
        }

        async fn reap_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
            Err(offline())
        }
    }

    #[async_trait]
    impl RequestLogStore for OfflineStore {
        async fn append(&self, _record: &RequestRecord) -> Result<i64, StoreError> {
            Err(offline())
        }

        async fn recent(&self, _limit: i64) -> Result<Vec<RequestLogEntry>, StoreError> {
            Err(offline())
        }

        async fn category_counts(
            &self,
            _since: DateTime<Utc>,
        ) -> Result<Vec<CategoryCount>, StoreError> {
            Err(offline())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(offline())
        }
    }

    #[tokio::test]
    async fn storage_failures_never_fail_the_request() {
        let classifier = classifier_answering(json!([-1])).await;
        let store = Arc::new(OfflineStore);
        let pipeline = DefensePipeline::new(
            store.clone(),
            store,
            Arc::new(
                ClassifierClient::new(classifier_config(classifier.base_url.clone()))
                    .expect("classifier client"),
            ),
            defense_config(),
        );
        let app = app_with(Arc::new(pipeline));

        let response = app
            .oneshot(request_from("1.2.3.4", "/api/products"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(category_header(&response), "anomaly");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }
}
