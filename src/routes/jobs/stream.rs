//! SSE streaming degli eventi di un job

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::models::JobEvent;
use crate::services::stream::event_stream;

use super::JobsState;

/// Stream SSE degli eventi di avanzamento di un job
///
/// Ogni evento viene inviato una sola volta; lo stream si chiude dopo
/// l'evento terminale. Un solo client alla volta può essere collegato.
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/events",
    tag = "Jobs",
    params(
        ("id" = String, Path, description = "ID del job")
    ),
    responses(
        (status = 200, description = "Stream SSE degli eventi", body = JobEvent, content_type = "text/event-stream"),
        (status = 404, description = "Job non trovato"),
        (status = 409, description = "Stream già collegato"),
    )
)]
pub async fn job_events(
    State(state): State<JobsState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let subscription = state.store.subscribe(&id).await?;
    tracing::debug!("Client SSE collegato al job {}", subscription.job_id());

    let stream = event_stream(subscription).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
