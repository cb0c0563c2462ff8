//! Helpers shared by the crate's async tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::Request;
use axum::response::Response;
use bastion_core::fallback::FallbackRules;
use serde_json::Value;
use tokio::net::TcpListener;
use url::Url;

use crate::classifier::ClassifierClient;
use crate::config::ClassifierConfig;
use crate::state::AppState;
use crate::store::{MemoryBanStore, MemoryRequestLogStore};

/// Serves `app` on an ephemeral localhost port and returns its base URL.
pub async fn spawn_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("test server should run");
    });
    Url::parse(&format!("http://{addr}")).expect("base url should parse")
}

/// A localhost URL nothing is listening on.
pub async fn unused_base_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    drop(listener);
    Url::parse(&format!("http://{addr}")).expect("base url should parse")
}

/// In-memory app state whose classifier lives at `classifier_url`.
pub fn memory_state(classifier_url: Url) -> (AppState, MemoryBanStore, MemoryRequestLogStore) {
    let bans = MemoryBanStore::new();
    let logs = MemoryRequestLogStore::new();
    let classifier = ClassifierClient::new(ClassifierConfig {
        base_url: classifier_url,
        timeout: Duration::from_secs(1),
        max_retries: 0,
        retry_delay: Duration::from_millis(1),
        fallback_enabled: true,
        fallback_rules: FallbackRules::default(),
    })
    .expect("classifier client should build");

    let state = AppState {
        bans: Arc::new(bans.clone()),
        logs: Arc::new(logs.clone()),
        classifier: Arc::new(classifier),
    };
    (state, bans, logs)
}

/// Reads a JSON response body.
pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be json")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}
