//! Job routes module
//!
//! Creazione dei job di modifica, polling dello stato, download del risultato
//! e stream SSE degli eventi.

mod crud;
mod form;
mod stream;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::SharedSettings;
use crate::services::genai::ImageProvider;
use crate::services::runner::Pacer;
use crate::services::store::SharedJobStore;

// Re-export public items (including utoipa path types)
pub use crud::*;
pub use stream::*;

/// Shared state for job routes
#[derive(Clone)]
pub struct JobsState {
    pub store: SharedJobStore,
    pub settings: SharedSettings,
    pub provider: Arc<dyn ImageProvider>,
    pub pacer: Pacer,
    pub max_file_size_mb: u64,
}

pub fn router(state: JobsState) -> Router {
    let body_limit = (state.max_file_size_mb * 1024 * 1024) as usize;

    let uploads = Router::new()
        .route("/api/jobs", post(create_text_job))
        .route("/api/image/jobs", post(create_image_job))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit));

    Router::new()
        .merge(uploads)
        .route("/api/jobs/:id", get(get_job_status))
        .route("/api/jobs/:id/result", get(get_job_result))
        .route("/api/jobs/:id/result/file", get(download_job_result))
        .route("/api/jobs/:id/events", get(job_events))
        .with_state(state)
}
