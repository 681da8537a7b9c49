use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::JobStatus;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Stato dell'API
    pub status: String,
    /// Versione dell'API
    pub version: String,
    /// Job attualmente tracciati in memoria
    pub jobs: usize,
}

/// Esito del controllo di connettività verso il provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ConnectivityResponse {
    /// "ok" oppure il tipo di errore (auth_failed, upstream_error, ...)
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct JobStatusResponse {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct JobResultResponse {
    pub id: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}
