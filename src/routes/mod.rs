pub mod config;
pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::{response::Redirect, routing::get, Router};

use crate::config::{Config, SharedSettings};
use crate::services::genai::ImageProvider;
use crate::services::runner::Pacer;
use crate::services::store::SharedJobStore;

pub fn create_router(
    store: SharedJobStore,
    settings: SharedSettings,
    provider: Arc<dyn ImageProvider>,
    app_config: &Config,
) -> Router {
    let jobs_state = jobs::JobsState {
        store: store.clone(),
        settings: settings.clone(),
        provider: provider.clone(),
        pacer: Pacer::new(app_config.step_delay()),
        max_file_size_mb: app_config.max_file_size_mb,
    };
    let health_state = health::HealthState {
        store,
        settings: settings.clone(),
        provider,
    };

    Router::new()
        .route("/", get(|| async { Redirect::temporary("/swagger-ui/") }))
        .merge(health::router(health_state))
        .merge(jobs::router(jobs_state))
        .merge(config::router(settings))
}
