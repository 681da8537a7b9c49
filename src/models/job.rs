use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tipo di job: determina l'etichetta della seconda milestone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Text,
    Image,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Text => write!(f, "text"),
            JobKind::Image => write!(f, "image"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Validating,
    Uploading,
    Processing,
    Finalizing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Validating => write!(f, "validating"),
            JobStatus::Uploading => write!(f, "uploading"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Finalizing => write!(f, "finalizing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Classificazione stabile di un errore upstream, mostrata al client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthFailed,
    RateLimited,
    UpstreamError,
    NetworkUnreachable,
    UnknownError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AuthFailed => write!(f, "auth_failed"),
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::UpstreamError => write!(f, "upstream_error"),
            ErrorKind::NetworkUnreachable => write!(f, "network_unreachable"),
            ErrorKind::UnknownError => write!(f, "unknown_error"),
        }
    }
}

/// Evento inviato sul feed SSE di un job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    Progress {
        status: JobStatus,
        progress: u8,
        message: Option<String>,
    },
    Completed,
    Failed {
        message: String,
        kind: ErrorKind,
    },
}

impl JobEvent {
    pub fn progress(status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        JobEvent::Progress {
            status,
            progress,
            message: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed | JobEvent::Failed { .. })
    }
}

/// Risultato di un job completato
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub data: Bytes,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}
