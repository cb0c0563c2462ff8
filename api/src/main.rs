use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod classifier;
mod config;
mod error;
mod middleware;
mod reaper;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use crate::classifier::ClassifierClient;
use crate::config::{ClassifierConfig, DefenseConfig, StorageBackend};
use crate::middleware::defense::{DefenseLayer, DefensePipeline};
use crate::state::AppState;
use crate::store::{
    BanStore, MemoryBanStore, MemoryRequestLogStore, PgBanStore, PgRequestLogStore,
    RequestLogStore,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bastion API",
        version = "0.1.0",
        description = "Request-time anomaly defense: classifies every request, bans anomalous addresses, and reports on what it saw."
    ),
    paths(
        routes::health::health_check,
        routes::health::classifier_health,
        routes::analytics::request_stats,
        routes::analytics::recent_requests,
        routes::bans::list_bans,
        routes::bans::get_ban,
    ),
    components(schemas(
        HealthResponse,
        routes::health::ClassifierHealthResponse,
        routes::analytics::CategoryTotals,
        routes::analytics::RequestStatsResponse,
        routes::analytics::RecentRequestsResponse,
        routes::bans::BanListResponse,
        bastion_core::error::ApiError,
        bastion_core::bans::BanEntry,
        bastion_core::requests::RequestCategory,
        bastion_core::requests::RequestRecord,
        bastion_core::requests::RequestLogEntry,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Routes, rate limits and the defense pipeline. Outer HTTP layers are added by `main`.
fn build_app(state: AppState, defense: DefenseConfig) -> Router {
    let trust_forwarded_for = defense.trust_forwarded_for;
    let read_limit = move || middleware::rate_limit::api_read_layer(trust_forwarded_for);
    let pipeline = DefensePipeline::new(
        state.bans.clone(),
        state.logs.clone(),
        state.classifier.clone(),
        defense,
    );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::health::admin_router().layer(read_limit()))
        .merge(routes::analytics::router().layer(read_limit()))
        .merge(routes::bans::router().layer(read_limit()))
        .layer(DefenseLayer::new(Arc::new(pipeline)))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bastion_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let backend = StorageBackend::from_env().expect("invalid STORAGE_BACKEND");
    let classifier_config = ClassifierConfig::from_env().expect("invalid classifier config");
    let defense_config = DefenseConfig::from_env().expect("invalid defense config");
    let port = config::port().expect("invalid PORT");

    let (bans, logs): (Arc<dyn BanStore>, Arc<dyn RequestLogStore>) = match backend {
        StorageBackend::Postgres => {
            let database_url = config::database_url().expect("DATABASE_URL must be set");
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .connect(&database_url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!("../migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            (
                Arc::new(PgBanStore::new(pool.clone())),
                Arc::new(PgRequestLogStore::new(pool)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; bans and request logs are lost on restart");
            (
                Arc::new(MemoryBanStore::new()),
                Arc::new(MemoryRequestLogStore::new()),
            )
        }
    };

    tracing::info!(
        service_url = %classifier_config.base_url,
        fallback_enabled = classifier_config.fallback_enabled,
        max_retries = classifier_config.max_retries,
        "anomaly classifier configured"
    );
    let classifier = ClassifierClient::new(classifier_config).expect("Failed to build classifier client");

    if let Some(period) = defense_config.reap_interval {
        reaper::spawn(bans.clone(), period);
    }

    let app_state = AppState {
        bans,
        logs,
        classifier: Arc::new(classifier),
    };

    let app = build_app(app_state, defense_config).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::cors::build_cors_layer()),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Bastion API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
