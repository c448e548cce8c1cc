//! HTTP API gateway for Disha.
//!
//! Exposes the chat service as a small REST API plus a health check. The
//! acting user is picked with `?username=` and defaults to `default_user`.
//!
//! Built on Axum.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use chrono::{DateTime, Utc};
use disha_coach::ChatService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub service: Arc<ChatService>,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn shared(service: Arc<ChatService>) -> SharedState {
        Arc::new(Self {
            service,
            started_at: Utc::now(),
        })
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - CORS for browser clients
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api::api_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve until Ctrl-C, then wait for in-flight memory extractions.
pub async fn serve(service: Arc<ChatService>, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(GatewayState::shared(service.clone()));

    info!(addr = %addr, provider = service.provider_name(), "Gateway starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.drain_extractions().await;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub provider: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let database = match state.service.check_storage().await {
        Ok(()) => "healthy",
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            "unhealthy"
        }
    };
    let now = Utc::now();
    Json(HealthResponse {
        status: database.to_string(),
        database: database.to_string(),
        provider: state.service.provider_name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime_secs: (now - state.started_at).num_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use disha_coach::Stores;
    use disha_config::AppConfig;
    use disha_providers::DemoProvider;
    use disha_store::InMemoryStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let service = ChatService::new(
            Stores::shared(InMemoryStore::new()),
            Arc::new(DemoProvider::new()),
            AppConfig::default(),
        );
        GatewayState::shared(Arc::new(service))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.provider, "demo");
    }

    #[tokio::test]
    async fn only_api_routes_are_served() {
        let app = build_router(test_state());

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let app = build_router(test_state());
        let huge = format!(r#"{{"message": "{}"}}"#, "a".repeat(BODY_LIMIT + 1));

        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(huge))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
