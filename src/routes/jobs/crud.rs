//! Creazione, stato e risultato dei job

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::error::{AppError, Result};
use crate::models::{JobKind, JobResultResponse, JobStatusResponse, UploadedFile};
use crate::services::edit::{ImageEdit, TextEdit};
use crate::services::genai::{ImageEditRequest, InlineImage};
use crate::services::runner::{spawn_job, JobTask};
use crate::services::store::new_job_id;
use crate::utils::{
    content_disposition, decode_utf8, get_mime_type, parse_image_region, sniff_image_mime,
    validate_image_count, validate_image_upload, validate_region_within, validate_text_region,
};

use super::form::{read_image_form, read_text_form};
use super::JobsState;

const DEFAULT_RESULT_NAME: &str = "result.bin";
const DEFAULT_RESULT_MIME: &str = "application/octet-stream";

fn inline_image(upload: UploadedFile) -> InlineImage {
    let mime = sniff_image_mime(&upload.data)
        .map(str::to_string)
        .or(upload.content_type)
        .unwrap_or_else(|| "image/png".to_string());
    InlineImage {
        mime,
        data: upload.data,
    }
}

/// Crea un job di modifica testo
///
/// Sostituisce i caratteri `[region_start, region_end)` del file con `description`.
#[utoipa::path(
    post,
    path = "/api/jobs",
    tag = "Jobs",
    request_body(content_type = "multipart/form-data", description = "file, region_start, region_end, description, file_name?, mime?"),
    responses(
        (status = 200, description = "Job creato", body = JobStatusResponse),
        (status = 400, description = "Richiesta non valida"),
        (status = 413, description = "File troppo grande"),
        (status = 415, description = "File non UTF-8"),
    )
)]
pub async fn create_text_job(
    State(state): State<JobsState>,
    multipart: Multipart,
) -> Result<Json<JobStatusResponse>> {
    let form = read_text_form(multipart, state.max_file_size_mb).await?;

    let file = form
        .file
        .ok_or_else(|| AppError::MissingField("file".to_string()))?;
    let region_start = form
        .region_start
        .ok_or_else(|| AppError::MissingField("region_start".to_string()))?;
    let region_end = form
        .region_end
        .ok_or_else(|| AppError::MissingField("region_end".to_string()))?;
    let description = form
        .description
        .ok_or_else(|| AppError::MissingField("description".to_string()))?;

    let (start, end) = validate_text_region(region_start, region_end)?;
    let text = decode_utf8(&file.data)?;
    validate_region_within(text, end)?;

    let file_name = form.file_name.or_else(|| file.file_name.clone());
    let mime = form
        .mime
        .or_else(|| file.content_type.clone())
        .or_else(|| file_name.as_deref().map(get_mime_type));

    let job_id = new_job_id();
    let record = state.store.create(&job_id, JobKind::Text).await?;
    let response = record.status_response();

    tracing::info!(
        "Job testo {} creato: file={:?}, regione={}..{}",
        job_id,
        file_name,
        start,
        end
    );

    let operation = TextEdit::new(file.data, start..end, description);
    spawn_job(
        state.store.clone(),
        job_id,
        JobTask::new(Box::new(operation), file_name, mime),
        state.pacer,
    );

    Ok(Json(response))
}

/// Crea un job di modifica immagine tramite il provider GenAI
#[utoipa::path(
    post,
    path = "/api/image/jobs",
    tag = "Jobs",
    request_body(content_type = "multipart/form-data", description = "image, references*, description|prompt, region_x/y/width/height?, file_name?, mime?"),
    responses(
        (status = 200, description = "Job creato", body = JobStatusResponse),
        (status = 400, description = "Richiesta non valida o troppe immagini"),
        (status = 413, description = "File troppo grande"),
        (status = 415, description = "Upload non immagine"),
    )
)]
pub async fn create_image_job(
    State(state): State<JobsState>,
    multipart: Multipart,
) -> Result<Json<JobStatusResponse>> {
    let form = read_image_form(multipart, state.max_file_size_mb).await?;
    let config = state.settings.snapshot();

    let image = form
        .image
        .ok_or_else(|| AppError::MissingField("image".to_string()))?;
    validate_image_upload(&image)?;
    for reference in &form.references {
        validate_image_upload(reference)?;
    }

    if form.description.is_none() && form.prompt.is_none() {
        return Err(AppError::MissingField("description".to_string()));
    }
    let region = parse_image_region(
        form.region_x,
        form.region_y,
        form.region_width,
        form.region_height,
    )?;
    validate_image_count(1 + form.references.len(), config.max_images_for_model())?;

    let mut prompt = form
        .description
        .filter(|d| !d.is_empty())
        .or(form.prompt)
        .unwrap_or_default();
    if let Some(region) = region {
        prompt.push_str(&region.prompt_hint());
    }

    let file_name = form.file_name.or_else(|| image.file_name.clone());
    let request = ImageEditRequest {
        prompt,
        image: inline_image(image),
        references: form.references.into_iter().map(inline_image).collect(),
    };

    let job_id = new_job_id();
    let record = state.store.create(&job_id, JobKind::Image).await?;
    let response = record.status_response();

    tracing::info!(
        "Job immagine {} creato: modello={}, riferimenti={}, regione={:?}",
        job_id,
        config.nano_banana_model,
        request.references.len(),
        region
    );

    let operation = ImageEdit::new(state.provider.clone(), config, request);
    spawn_job(
        state.store.clone(),
        job_id,
        JobTask::new(Box::new(operation), file_name, form.mime),
        state.pacer,
    );

    Ok(Json(response))
}

/// Ottieni lo stato di un job
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    tag = "Jobs",
    params(
        ("id" = String, Path, description = "ID del job")
    ),
    responses(
        (status = 200, description = "Stato del job", body = JobStatusResponse),
        (status = 404, description = "Job non trovato"),
    )
)]
pub async fn get_job_status(
    State(state): State<JobsState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>> {
    let record = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| AppError::JobNotFound(id.clone()))?;
    Ok(Json(record.status_response()))
}

/// Metadati del risultato, disponibili solo a job completato
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/result",
    tag = "Jobs",
    params(
        ("id" = String, Path, description = "ID del job")
    ),
    responses(
        (status = 200, description = "Metadati del risultato", body = JobResultResponse),
        (status = 404, description = "Job non trovato o risultato non pronto"),
    )
)]
pub async fn get_job_result(
    State(state): State<JobsState>,
    Path(id): Path<String>,
) -> Result<Json<JobResultResponse>> {
    let output = state
        .store
        .get(&id)
        .await
        .and_then(|record| record.result())
        .ok_or_else(|| AppError::ResultNotReady(id.clone()))?;

    Ok(Json(JobResultResponse {
        id,
        file_name: output.file_name,
        mime: output.mime,
    }))
}

/// Scarica il file risultato
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/result/file",
    tag = "Jobs",
    params(
        ("id" = String, Path, description = "ID del job")
    ),
    responses(
        (status = 200, description = "File risultato", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "Job non trovato o risultato non pronto"),
    )
)]
pub async fn download_job_result(
    State(state): State<JobsState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let output = state
        .store
        .get(&id)
        .await
        .and_then(|record| record.result())
        .ok_or_else(|| AppError::ResultNotReady(id.clone()))?;

    let file_name = output
        .file_name
        .unwrap_or_else(|| DEFAULT_RESULT_NAME.to_string());
    let mime = output
        .mime
        .unwrap_or_else(|| DEFAULT_RESULT_MIME.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
        ],
        output.data,
    ))
}
