//! Client per l'API `generateContent` del provider GenAI (modelli immagine Gemini)

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::models::ConnectivityResponse;
use crate::services::classifier::{self, messages};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Header di risposta utili per correlare una richiesta lato provider
pub const REQUEST_ID_HEADERS: &[&str] = &[
    "x-request-id",
    "x-goog-request-id",
    "x-guploader-uploadid",
    "x-goog-trace-id",
];

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key mancante: imposta NANO_BANANA_API_KEY")]
    MissingApiKey,

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<i64>,
        status_text: Option<String>,
        message: String,
        details: Option<serde_json::Value>,
        request_ids: Vec<(String, String)>,
    },

    #[error("errore di rete: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("client HTTP non valido: {0}")]
    Client(#[source] reqwest::Error),

    #[error("risposta non valida: {0}")]
    InvalidResponse(String),

    #[error("nessuna immagine restituita dal provider")]
    NoImage,
}

impl ProviderError {
    pub fn variant_name(&self) -> &'static str {
        match self {
            ProviderError::MissingApiKey => "ProviderError::MissingApiKey",
            ProviderError::Http { .. } => "ProviderError::Http",
            ProviderError::Transport(_) => "ProviderError::Transport",
            ProviderError::Client(_) => "ProviderError::Client",
            ProviderError::InvalidResponse(_) => "ProviderError::InvalidResponse",
            ProviderError::NoImage => "ProviderError::NoImage",
        }
    }
}

/// Immagine inviata inline al provider
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct ImageEditRequest {
    pub prompt: String,
    pub image: InlineImage,
    pub references: Vec<InlineImage>,
}

#[derive(Debug, Clone)]
pub struct EditedImage {
    pub data: Bytes,
    pub mime: Option<String>,
}

/// Servizio esterno che esegue la modifica delle immagini
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn edit_image(
        &self,
        config: &ProviderConfig,
        request: &ImageEditRequest,
    ) -> Result<EditedImage, ProviderError>;

    async fn check_connectivity(&self, config: &ProviderConfig) -> ConnectivityResponse;
}

// Formato richiesta generateContent

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<String>,
}

// Formato risposta

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
    status: Option<String>,
    details: Option<serde_json::Value>,
}

/// Client HTTP verso il provider; costruisce un `reqwest::Client` per ogni
/// configurazione perché timeout e proxy possono cambiare a runtime.
#[derive(Debug, Default, Clone)]
pub struct GenAiClient;

impl GenAiClient {
    pub fn new() -> Self {
        Self
    }

    fn http_client(&self, config: &ProviderConfig) -> Result<reqwest::Client, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if config.nano_banana_timeout > 0 {
            builder = builder.timeout(Duration::from_secs(config.nano_banana_timeout));
        }
        if !config.nano_banana_trust_env {
            builder = builder.no_proxy();
        }
        if let Some(proxy) = config.nano_banana_proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(ProviderError::Client)?;
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(ProviderError::Client)
    }

    fn api_key(config: &ProviderConfig) -> Result<&str, ProviderError> {
        config
            .nano_banana_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ProviderError::MissingApiKey)
    }
}

#[async_trait]
impl ImageProvider for GenAiClient {
    async fn edit_image(
        &self,
        config: &ProviderConfig,
        request: &ImageEditRequest,
    ) -> Result<EditedImage, ProviderError> {
        let api_key = Self::api_key(config)?;
        let client = self.http_client(config)?;
        let url = format!(
            "{}models/{}:generateContent",
            base_url(config),
            config.nano_banana_model
        );

        tracing::debug!(
            "Richiesta generateContent: modello={}, riferimenti={}",
            config.nano_banana_model,
            request.references.len()
        );

        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&build_request(config, request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let body = response.bytes().await?;
        let payload: GenerateContentResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let inline = payload
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.inline_data)
            .find(|d| !d.data.is_empty())
            .ok_or(ProviderError::NoImage)?;

        let data = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(format!("base64 non valido: {}", e)))?;

        Ok(EditedImage {
            data: Bytes::from(data),
            mime: inline.mime_type,
        })
    }

    async fn check_connectivity(&self, config: &ProviderConfig) -> ConnectivityResponse {
        let api_key = match Self::api_key(config) {
            Ok(key) => key,
            Err(_) => {
                return ConnectivityResponse {
                    status: "auth_failed".to_string(),
                    message: messages::MISSING_API_KEY.to_string(),
                }
            }
        };

        let result = match self.http_client(config) {
            Ok(client) => client
                .get(format!("{}models", base_url(config)))
                .header("x-goog-api-key", api_key)
                .send()
                .await
                .map_err(ProviderError::from),
            Err(e) => Err(e),
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let classification = classifier::classify(&e);
                return ConnectivityResponse {
                    status: classification.kind.to_string(),
                    message: classification.message,
                };
            }
        };

        let status = response.status().as_u16();
        match status {
            401 | 403 => ConnectivityResponse {
                status: "auth_failed".to_string(),
                message: messages::INVALID_API_KEY.to_string(),
            },
            s if s >= 400 => ConnectivityResponse {
                status: "upstream_error".to_string(),
                message: messages::upstream(s),
            },
            _ => ConnectivityResponse {
                status: "ok".to_string(),
                message: messages::CONNECTIVITY_OK.to_string(),
            },
        }
    }
}

fn base_url(config: &ProviderConfig) -> String {
    let base = config
        .nano_banana_base_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(DEFAULT_BASE_URL);
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}

fn build_request(config: &ProviderConfig, request: &ImageEditRequest) -> GenerateContentRequest {
    let mut parts = vec![RequestPart::Text {
        text: request.prompt.clone(),
    }];
    for image in std::iter::once(&request.image).chain(request.references.iter()) {
        parts.push(RequestPart::Inline {
            inline_data: InlineData {
                mime_type: image.mime.clone(),
                data: STANDARD.encode(&image.data),
            },
        });
    }

    let image_config = ImageConfig {
        aspect_ratio: normalize_aspect_ratio(&config.nano_banana_aspect_ratio),
        image_size: if config.supports_image_size() && !config.nano_banana_image_size.is_empty() {
            Some(config.nano_banana_image_size.clone())
        } else {
            None
        },
    };
    let image_config = if image_config.aspect_ratio.is_none() && image_config.image_size.is_none() {
        None
    } else {
        Some(image_config)
    };

    let response_modalities = normalize_modalities(&config.nano_banana_response_modalities);
    let generation_config = if response_modalities.is_none() && image_config.is_none() {
        None
    } else {
        Some(GenerationConfig {
            response_modalities,
            image_config,
        })
    };

    let tools = if config.nano_banana_enable_search {
        vec![serde_json::json!({ "google_search": {} })]
    } else {
        Vec::new()
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config,
        tools,
    }
}

/// IMAGE è sempre incluso; la combinazione di default TEXT+IMAGE non viene inviata
fn normalize_modalities(raw: &str) -> Option<Vec<String>> {
    let mut items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_uppercase())
        .filter(|item| !item.is_empty())
        .collect();
    if !items.iter().any(|item| item == "IMAGE") {
        items.push("IMAGE".to_string());
    }

    let mut distinct = items.clone();
    distinct.sort();
    distinct.dedup();
    if distinct == ["IMAGE", "TEXT"] {
        None
    } else {
        Some(items)
    }
}

fn normalize_aspect_ratio(value: &str) -> Option<String> {
    let cleaned = value.trim();
    match cleaned.to_lowercase().as_str() {
        "" | "auto" | "keep" | "default" => None,
        _ => Some(cleaned.to_string()),
    }
}

async fn http_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let request_ids = REQUEST_ID_HEADERS
        .iter()
        .filter_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();

    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorEnvelope>(&text).ok().map(|e| e.error);

    let message = body
        .as_ref()
        .and_then(|b| b.message.clone())
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(200).collect())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("errore HTTP").to_string());

    ProviderError::Http {
        status: status.as_u16(),
        code: body.as_ref().and_then(|b| b.code),
        status_text: body.as_ref().and_then(|b| b.status.clone()),
        message,
        details: body.and_then(|b| b.details),
        request_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use serde_json::json;

    fn config_for(server: &mockito::ServerGuard) -> ProviderConfig {
        ProviderConfig {
            nano_banana_api_key: Some("test-key".to_string()),
            nano_banana_model: "test-model".to_string(),
            nano_banana_base_url: Some(server.url()),
            nano_banana_timeout: 5,
            nano_banana_trust_env: false,
            ..Default::default()
        }
    }

    fn request() -> ImageEditRequest {
        ImageEditRequest {
            prompt: "make it blue".to_string(),
            image: InlineImage {
                mime: "image/png".to_string(),
                data: Bytes::from_static(b"primary"),
            },
            references: vec![InlineImage {
                mime: "image/jpeg".to_string(),
                data: Bytes::from_static(b"reference"),
            }],
        }
    }

    #[test]
    fn test_modalities_normalization() {
        assert_eq!(normalize_modalities("TEXT,IMAGE"), None);
        assert_eq!(normalize_modalities(" image , text "), None);
        assert_eq!(normalize_modalities("IMAGE"), Some(vec!["IMAGE".to_string()]));
        assert_eq!(normalize_modalities(""), Some(vec!["IMAGE".to_string()]));
        assert_eq!(
            normalize_modalities("TEXT,AUDIO"),
            Some(vec!["TEXT".to_string(), "AUDIO".to_string(), "IMAGE".to_string()])
        );
    }

    #[test]
    fn test_request_body() {
        let config = ProviderConfig {
            nano_banana_model: "gemini-3-pro-image-preview".to_string(),
            nano_banana_aspect_ratio: "16:9".to_string(),
            nano_banana_enable_search: true,
            ..Default::default()
        };
        let body = serde_json::to_value(build_request(&config, &request())).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0], json!({ "text": "make it blue" }));
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], STANDARD.encode(b"primary"));
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(
            body["generationConfig"],
            json!({ "imageConfig": { "aspectRatio": "16:9", "imageSize": "1K" } })
        );
        assert_eq!(body["tools"], json!([{ "google_search": {} }]));
    }

    #[test]
    fn test_request_body_defaults() {
        let config = ProviderConfig {
            nano_banana_model: "gemini-2.5-flash-image".to_string(),
            ..Default::default()
        };
        let body = serde_json::to_value(build_request(&config, &request())).unwrap();
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let config = ProviderConfig::default();
        let err = GenAiClient::new()
            .edit_image(&config, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_edit_image_success() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "ecco" },
                    { "inlineData": { "mimeType": "image/webp", "data": STANDARD.encode(b"edited") } }
                ]}
            }]
        });
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let result = GenAiClient::new()
            .edit_image(&config_for(&server), &request())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.data, Bytes::from_static(b"edited"));
        assert_eq!(result.mime.as_deref(), Some("image/webp"));
    }

    #[tokio::test]
    async fn test_edit_image_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .with_status(403)
            .with_header("x-goog-request-id", "req-42")
            .with_body(
                json!({ "error": { "code": 403, "message": "denied", "status": "PERMISSION_DENIED" } })
                    .to_string(),
            )
            .create_async()
            .await;

        let err = GenAiClient::new()
            .edit_image(&config_for(&server), &request())
            .await
            .unwrap_err();

        match &err {
            ProviderError::Http {
                status,
                code,
                status_text,
                message,
                request_ids,
                ..
            } => {
                assert_eq!(*status, 403);
                assert_eq!(*code, Some(403));
                assert_eq!(status_text.as_deref(), Some("PERMISSION_DENIED"));
                assert_eq!(message, "denied");
                assert!(request_ids.contains(&("x-goog-request-id".to_string(), "req-42".to_string())));
            }
            other => panic!("errore inatteso: {other:?}"),
        }
        assert_eq!(classifier::classify(&err).kind, ErrorKind::AuthFailed);
    }

    #[tokio::test]
    async fn test_edit_image_without_image_part() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .with_status(200)
            .with_body(json!({ "candidates": [{ "content": { "parts": [{ "text": "no" }] } }] }).to_string())
            .create_async()
            .await;

        let err = GenAiClient::new()
            .edit_image(&config_for(&server), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NoImage));
    }

    #[tokio::test]
    async fn test_connectivity() {
        let client = GenAiClient::new();

        let mut healthy = mockito::Server::new_async().await;
        healthy
            .mock("GET", "/models")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let report = client.check_connectivity(&config_for(&healthy)).await;
        assert_eq!(report.status, "ok");

        let mut rejecting = mockito::Server::new_async().await;
        rejecting
            .mock("GET", "/models")
            .with_status(401)
            .create_async()
            .await;
        let report = client.check_connectivity(&config_for(&rejecting)).await;
        assert_eq!(report.status, "auth_failed");
        assert_eq!(report.message, messages::INVALID_API_KEY);

        let mut broken = mockito::Server::new_async().await;
        broken
            .mock("GET", "/models")
            .with_status(502)
            .create_async()
            .await;
        let report = client.check_connectivity(&config_for(&broken)).await;
        assert_eq!(report.status, "upstream_error");

        let report = client.check_connectivity(&ProviderConfig::default()).await;
        assert_eq!(report.status, "auth_failed");
        assert_eq!(report.message, messages::MISSING_API_KEY);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let mut config = ProviderConfig::default();
        assert_eq!(base_url(&config), DEFAULT_BASE_URL);
        config.nano_banana_base_url = Some("http://proxy.local/v1beta".to_string());
        assert_eq!(base_url(&config), "http://proxy.local/v1beta/");
    }
}
