//! API router

use crate::application::events::LifecycleBus;
use crate::domain::presence::PresenceOracle;
use crate::infrastructure::credential::CredentialMinter;
use crate::interface::api::credentials_handler::mint_credential;
use crate::interface::api::events_ws::events_handler;
use crate::interface::api::presence_handler::{get_presence, heartbeat, mark_offline};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct AppState {
    pub minter: Arc<CredentialMinter>,
    pub presence: Arc<PresenceOracle>,
    pub bus: LifecycleBus,
    pub default_credential_ttl_secs: i64,
}

pub fn build_router(state: AppState, prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(move || async move { prometheus.render() }))
        .route("/api/v1/calls/credentials", post(mint_credential))
        .route("/api/v1/presence/heartbeat", post(heartbeat))
        .route("/api/v1/presence/offline", post(mark_offline))
        .route("/api/v1/presence/:user_id", get(get_presence))
        .route("/ws/events", get(events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
