//! Routes per la configurazione del provider GenAI

use axum::{extract::State, routing::get, Json, Router};

use crate::config::{ProviderConfig, ProviderConfigPatch, SharedSettings};
use crate::error::Result;

pub fn router(settings: SharedSettings) -> Router {
    Router::new()
        .route("/api/config", get(get_config).post(update_config))
        .with_state(settings)
}

/// Configurazione corrente del provider (la API key non viene mai restituita)
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "Config",
    responses(
        (status = 200, description = "Configurazione provider", body = ProviderConfig),
    )
)]
pub async fn get_config(State(settings): State<SharedSettings>) -> Json<ProviderConfig> {
    Json(settings.snapshot())
}

/// Aggiorna la configurazione; i campi assenti restano invariati
#[utoipa::path(
    post,
    path = "/api/config",
    tag = "Config",
    request_body = ProviderConfigPatch,
    responses(
        (status = 200, description = "Configurazione aggiornata", body = ProviderConfig),
        (status = 500, description = "Errore di scrittura del file di configurazione"),
    )
)]
pub async fn update_config(
    State(settings): State<SharedSettings>,
    Json(patch): Json<ProviderConfigPatch>,
) -> Result<Json<ProviderConfig>> {
    let updated = settings.update(patch)?;
    tracing::info!(
        "Configurazione provider aggiornata: modello={}, api_key={}",
        updated.nano_banana_model,
        if updated.has_api_key() { "impostata" } else { "assente" }
    );
    Ok(Json(updated))
}
