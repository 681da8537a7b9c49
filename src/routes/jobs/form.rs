//! Lettura dei form multipart di creazione job

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;

use crate::error::{AppError, Result};
use crate::models::{ImageJobForm, TextJobForm, UploadedFile};

fn multipart_error(err: MultipartError, max_file_size_mb: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge(max_file_size_mb)
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn read_upload(field: Field<'_>, max_file_size_mb: u64) -> Result<UploadedFile> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let data = field
        .bytes()
        .await
        .map_err(|e| multipart_error(e, max_file_size_mb))?;
    Ok(UploadedFile {
        file_name,
        content_type,
        data,
    })
}

async fn read_text(field: Field<'_>, max_file_size_mb: u64) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| multipart_error(e, max_file_size_mb))
}

fn parse_int(name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Il campo {} deve essere un intero", name)))
}

// stringa vuota equivale a campo assente
fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

pub async fn read_text_form(mut multipart: Multipart, max_file_size_mb: u64) -> Result<TextJobForm> {
    let mut form = TextJobForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size_mb))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(read_upload(field, max_file_size_mb).await?),
            "region_start" => {
                let value = read_text(field, max_file_size_mb).await?;
                form.region_start = Some(parse_int(&name, &value)?);
            }
            "region_end" => {
                let value = read_text(field, max_file_size_mb).await?;
                form.region_end = Some(parse_int(&name, &value)?);
            }
            "description" => form.description = Some(read_text(field, max_file_size_mb).await?),
            "file_name" => form.file_name = non_empty(read_text(field, max_file_size_mb).await?),
            "mime" => form.mime = non_empty(read_text(field, max_file_size_mb).await?),
            other => tracing::debug!("Campo multipart ignorato: {}", other),
        }
    }

    Ok(form)
}

pub async fn read_image_form(mut multipart: Multipart, max_file_size_mb: u64) -> Result<ImageJobForm> {
    let mut form = ImageJobForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size_mb))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => form.image = Some(read_upload(field, max_file_size_mb).await?),
            "references" => form.references.push(read_upload(field, max_file_size_mb).await?),
            "description" => form.description = Some(read_text(field, max_file_size_mb).await?),
            "prompt" => form.prompt = Some(read_text(field, max_file_size_mb).await?),
            "region_x" | "region_y" | "region_width" | "region_height" => {
                let value = read_text(field, max_file_size_mb).await?;
                let value = parse_int(&name, &value)?;
                match name.as_str() {
                    "region_x" => form.region_x = Some(value),
                    "region_y" => form.region_y = Some(value),
                    "region_width" => form.region_width = Some(value),
                    _ => form.region_height = Some(value),
                }
            }
            "file_name" => form.file_name = non_empty(read_text(field, max_file_size_mb).await?),
            "mime" => form.mime = non_empty(read_text(field, max_file_size_mb).await?),
            other => tracing::debug!("Campo multipart ignorato: {}", other),
        }
    }

    Ok(form)
}
