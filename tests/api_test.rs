use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tinycraft::config::{Config, ProviderConfig, SettingsStore};
use tinycraft::models::{ConnectivityResponse, JobResultResponse, JobStatus, JobStatusResponse};
use tinycraft::routes::create_router;
use tinycraft::services::genai::{EditedImage, ImageEditRequest, ImageProvider, ProviderError};
use tinycraft::services::store::JobStore;

const BOUNDARY: &str = "tinycraft-test-boundary";
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

struct MockProvider {
    fail_with: Option<u16>,
}

#[async_trait]
impl ImageProvider for MockProvider {
    async fn edit_image(
        &self,
        _config: &ProviderConfig,
        request: &ImageEditRequest,
    ) -> Result<EditedImage, ProviderError> {
        if let Some(status) = self.fail_with {
            return Err(ProviderError::Http {
                status,
                code: Some(status as i64),
                status_text: Some("PERMISSION_DENIED".to_string()),
                message: "denied".to_string(),
                details: None,
                request_ids: Vec::new(),
            });
        }
        Ok(EditedImage {
            data: Bytes::from(format!("edited:{}", request.references.len())),
            mime: Some("image/webp".to_string()),
        })
    }

    async fn check_connectivity(&self, _config: &ProviderConfig) -> ConnectivityResponse {
        ConnectivityResponse {
            status: "ok".to_string(),
            message: "mock".to_string(),
        }
    }
}

struct TestApp {
    router: Router,
    store: Arc<JobStore>,
}

fn app_with(provider: MockProvider, model: &str, max_images: usize) -> TestApp {
    let config = Config {
        step_delay_ms: 1,
        ..Config::default()
    };
    let settings = Arc::new(SettingsStore::new(
        ProviderConfig {
            nano_banana_api_key: Some("test-key".to_string()),
            nano_banana_model: model.to_string(),
            nano_banana_max_images: max_images,
            ..Default::default()
        },
        None,
    ));
    let store = Arc::new(JobStore::new());
    let router = create_router(store.clone(), settings, Arc::new(provider), &config);
    TestApp { router, store }
}

fn app() -> TestApp {
    app_with(MockProvider { fail_with: None }, "gemini-3-pro-image-preview", 14)
}

enum Part {
    Text(&'static str, String),
    File {
        name: &'static str,
        file_name: &'static str,
        content_type: &'static str,
        data: Vec<u8>,
    },
}

fn text(name: &'static str, value: impl ToString) -> Part {
    Part::Text(name, value.to_string())
}

fn file(name: &'static str, file_name: &'static str, content_type: &'static str, data: &[u8]) -> Part {
    Part::File {
        name,
        file_name,
        content_type,
        data: data.to_vec(),
    }
}

fn multipart_request(uri: &str, parts: Vec<Part>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn wait_terminal(router: &Router, id: &str) -> JobStatusResponse {
    for _ in 0..500 {
        let (status, _, body) = send(router, get(&format!("/api/jobs/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        let job: JobStatusResponse = serde_json::from_slice(&body).unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("il job {} non è terminato", id);
}

fn sse_events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

fn text_job(content: &[u8], start: i64, end: i64, description: &str) -> Request<Body> {
    multipart_request(
        "/api/jobs",
        vec![
            file("file", "notes.txt", "text/plain", content),
            text("region_start", start),
            text("region_end", end),
            text("description", description),
        ],
    )
}

#[tokio::test]
async fn test_text_job_lifecycle_and_download() {
    let app = app();

    let (status, _, body) = send(&app.router, text_job(b"hello world", 0, 5, "ciao")).await;
    assert_eq!(status, StatusCode::OK);
    let created: JobStatusResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.status, JobStatus::Queued);
    assert_eq!(created.progress, 0);

    let done = wait_terminal(&app.router, &created.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.message.as_deref(), Some("completed (100%)"));

    let (status, _, body) = send(&app.router, get(&format!("/api/jobs/{}/result", created.id))).await;
    assert_eq!(status, StatusCode::OK);
    let result: JobResultResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(result.file_name.as_deref(), Some("notes.txt"));
    assert_eq!(result.mime.as_deref(), Some("text/plain"));

    let (status, headers, body) = send(
        &app.router,
        get(&format!("/api/jobs/{}/result/file", created.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"ciao world"));
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\"; filename*=UTF-8''notes.txt"
    );

    // polling dopo lo stato terminale è idempotente
    let again = wait_terminal(&app.router, &created.id).await;
    assert_eq!(again, done);
}

#[tokio::test]
async fn test_text_job_event_stream() {
    let app = app();
    let (_, _, body) = send(&app.router, text_job(b"abc", 1, 2, "X")).await;
    let created: JobStatusResponse = serde_json::from_slice(&body).unwrap();

    let (status, headers, body) = send(
        &app.router,
        get(&format!("/api/jobs/{}/events", created.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = sse_events(&body);
    let statuses: Vec<_> = events
        .iter()
        .map(|e| e["status"].as_str().unwrap_or("-").to_string())
        .collect();
    assert_eq!(
        statuses,
        vec!["queued", "validating", "processing", "finalizing", "-"]
    );
    assert_eq!(events[3]["message"], "finalizing (90%)");
    assert_eq!(events[4], serde_json::json!({ "type": "completed" }));
}

#[tokio::test]
async fn test_image_job_auth_failure() {
    let app = app_with(
        MockProvider { fail_with: Some(403) },
        "gemini-3-pro-image-preview",
        14,
    );

    let request = multipart_request(
        "/api/image/jobs",
        vec![
            file("image", "photo.png", "image/png", PNG),
            text("prompt", "make the sky purple"),
        ],
    );
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    let created: JobStatusResponse = serde_json::from_slice(&body).unwrap();

    let (_, _, body) = send(
        &app.router,
        get(&format!("/api/jobs/{}/events", created.id)),
    )
    .await;
    let events = sse_events(&body);
    assert_eq!(events[1]["status"], "uploading");
    assert_eq!(
        events.last().unwrap(),
        &serde_json::json!({
            "type": "failed",
            "message": "Autenticazione fallita: API Key non valida o senza permessi",
            "kind": "auth_failed"
        })
    );

    let job = wait_terminal(&app.router, &created.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    let (status, _, _) = send(&app.router, get(&format!("/api/jobs/{}/result", created.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_job_success_uses_provider_mime() {
    let app = app();
    let request = multipart_request(
        "/api/image/jobs",
        vec![
            file("image", "photo.png", "image/png", PNG),
            file("references", "ref.png", "image/png", PNG),
            text("description", "blend"),
            text("region_x", 1),
            text("region_y", 2),
            text("region_width", 30),
            text("region_height", 40),
        ],
    );
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    let created: JobStatusResponse = serde_json::from_slice(&body).unwrap();

    let job = wait_terminal(&app.router, &created.id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let (_, headers, body) = send(
        &app.router,
        get(&format!("/api/jobs/{}/result/file", created.id)),
    )
    .await;
    assert_eq!(body, Bytes::from_static(b"edited:1"));
    assert_eq!(headers[header::CONTENT_TYPE], "image/webp");
}

#[tokio::test]
async fn test_too_many_images_rejected_before_creation() {
    let app = app_with(MockProvider { fail_with: None }, "gemini-2.5-flash-image", 14);
    let request = multipart_request(
        "/api/image/jobs",
        vec![
            file("image", "a.png", "image/png", PNG),
            file("references", "b.png", "image/png", PNG),
            file("references", "c.png", "image/png", PNG),
            file("references", "d.png", "image/png", PNG),
            text("prompt", "merge"),
        ],
    );
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["status"], 400);
    assert!(error["error"].as_str().unwrap().contains("Troppe immagini: 4 > 3"));
    assert!(app.store.is_empty().await);

    let app = app_with(MockProvider { fail_with: None }, "custom-model", 2);
    let request = multipart_request(
        "/api/image/jobs",
        vec![
            file("image", "a.png", "image/png", PNG),
            file("references", "b.png", "image/png", PNG),
            file("references", "c.png", "image/png", PNG),
            text("prompt", "merge"),
        ],
    );
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_submission_validation() {
    let app = app();

    let (status, _, _) = send(&app.router, text_job(b"hello", 4, 2, "x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app.router, text_job(&[0xFF, 0xFE, 0x00], 0, 1, "x")).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _, _) = send(&app.router, text_job(b"short", 0, 50, "x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = multipart_request(
        "/api/jobs",
        vec![file("file", "a.txt", "text/plain", b"abc"), text("region_start", 0)],
    );
    let (status, _, _) = send(&app.router, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let not_image = multipart_request(
        "/api/image/jobs",
        vec![
            file("image", "a.txt", "text/plain", b"abc"),
            text("prompt", "x"),
        ],
    );
    let (status, _, _) = send(&app.router, not_image).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let partial_region = multipart_request(
        "/api/image/jobs",
        vec![
            file("image", "a.png", "image/png", PNG),
            text("prompt", "x"),
            text("region_x", 3),
        ],
    );
    let (status, _, _) = send(&app.router, partial_region).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_prompt = multipart_request(
        "/api/image/jobs",
        vec![file("image", "a.png", "image/png", PNG)],
    );
    let (status, _, _) = send(&app.router, no_prompt).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = app();
    for path in ["", "/result", "/result/file", "/events"] {
        let (status, _, body) = send(&app.router, get(&format!("/api/jobs/missing{}", path))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "path {}", path);
        assert!(sse_events(&body).is_empty());
    }
}

#[tokio::test]
async fn test_second_subscriber_conflict() {
    let app = app();
    let (_, _, body) = send(&app.router, text_job(b"abc", 0, 1, "z")).await;
    let created: JobStatusResponse = serde_json::from_slice(&body).unwrap();

    let held = app.store.subscribe(&created.id).await.unwrap();
    let (status, _, _) = send(
        &app.router,
        get(&format!("/api/jobs/{}/events", created.id)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    drop(held);

    let (status, _, body) = send(
        &app.router,
        get(&format!("/api/jobs/{}/events", created.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sse_events(&body).last().unwrap()["type"], "completed");
}

#[tokio::test]
async fn test_health_config_and_index() {
    let app = app();

    let (status, _, body) = send(&app.router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["jobs"], 0);

    let (_, _, body) = send(&app.router, get("/api/health/connectivity")).await;
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["status"], "ok");

    let (status, _, body) = send(&app.router, get("/api/config")).await;
    assert_eq!(status, StatusCode::OK);
    let config: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(config["nano_banana_model"], "gemini-3-pro-image-preview");
    assert!(config.get("nano_banana_api_key").is_none());

    let update = Request::builder()
        .method("POST")
        .uri("/api/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"nano_banana_model":"gemini-2.5-flash-image"}"#))
        .unwrap();
    let (status, _, body) = send(&app.router, update).await;
    assert_eq!(status, StatusCode::OK);
    let config: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(config["nano_banana_model"], "gemini-2.5-flash-image");

    let (status, headers, _) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/swagger-ui/");
}
