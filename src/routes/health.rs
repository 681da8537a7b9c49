use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::config::SharedSettings;
use crate::models::{ConnectivityResponse, HealthResponse};
use crate::services::genai::ImageProvider;
use crate::services::store::SharedJobStore;

#[derive(Clone)]
pub struct HealthState {
    pub store: SharedJobStore,
    pub settings: SharedSettings,
    pub provider: Arc<dyn ImageProvider>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/health/connectivity", get(connectivity_check))
        .with_state(state)
}

/// Health check dell'API
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "API funzionante", body = HealthResponse),
    ),
    tag = "Sistema"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: state.store.len().await,
    })
}

/// Verifica la raggiungibilità del provider con la configurazione corrente
#[utoipa::path(
    get,
    path = "/api/health/connectivity",
    responses(
        (status = 200, description = "Esito del controllo", body = ConnectivityResponse),
    ),
    tag = "Sistema"
)]
pub async fn connectivity_check(State(state): State<HealthState>) -> Json<ConnectivityResponse> {
    let config = state.settings.snapshot();
    Json(state.provider.check_connectivity(&config).await)
}
