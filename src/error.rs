use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Job non trovato: {0}")]
    JobNotFound(String),

    #[error("Risultato non pronto: {0}")]
    ResultNotReady(String),

    #[error("Campo multipart mancante: {0}")]
    MissingField(String),

    #[error("Richiesta non valida: {0}")]
    BadRequest(String),

    #[error("Tipo di contenuto non supportato: {0}")]
    UnsupportedMediaType(String),

    #[error("File troppo grande: massimo {0} MB")]
    FileTooLarge(u64),

    #[error("Stream eventi già collegato per il job {0}")]
    StreamBusy(String),

    #[error("Errore di I/O: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Errore di configurazione: {0}")]
    ConfigError(#[from] serde_yaml::Error),

    #[error("Errore interno: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::JobNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::ResultNotReady(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::MissingField(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string())
            }
            AppError::FileTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            AppError::StreamBusy(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
