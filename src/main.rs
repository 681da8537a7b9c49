use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tinycraft::config::{Config, ProviderConfig, ProviderConfigPatch, SettingsStore};
use tinycraft::models::*;
use tinycraft::routes;
use tinycraft::services::genai::{GenAiClient, ImageProvider};
use tinycraft::services::store::{JobStore, SharedJobStore};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tinycraft API",
        version = "1.0.0",
        description = "API per la modifica asincrona di file di testo e immagini, con avanzamento via polling o SSE",
        license(name = "MIT"),
    ),
    paths(
        crate::routes::health::health_check,
        crate::routes::health::connectivity_check,
        crate::routes::jobs::create_text_job,
        crate::routes::jobs::create_image_job,
        crate::routes::jobs::get_job_status,
        crate::routes::jobs::get_job_result,
        crate::routes::jobs::download_job_result,
        crate::routes::jobs::job_events,
        crate::routes::config::get_config,
        crate::routes::config::update_config,
    ),
    components(schemas(
        HealthResponse,
        ConnectivityResponse,
        JobStatusResponse,
        JobResultResponse,
        JobStatus,
        JobKind,
        JobEvent,
        ErrorKind,
        ErrorResponse,
        ProviderConfig,
        ProviderConfigPatch,
    )),
    tags(
        (name = "Jobs", description = "Job di modifica asincroni"),
        (name = "Config", description = "Configurazione del provider GenAI"),
        (name = "Sistema", description = "Health check e connettività"),
    ),
    servers(
        (url = "http://localhost:8000", description = "Server locale"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Carica variabili da .env
    dotenvy::dotenv().ok();

    // Inizializza logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinycraft=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Carica configurazione
    let config = Config::from_env();

    let provider_config = match ProviderConfig::load(&config.config_path) {
        Ok(provider_config) => provider_config,
        Err(e) => {
            tracing::warn!(
                "Configurazione provider non leggibile ({}): uso i default. {}",
                config.config_path.display(),
                e
            );
            let mut fallback = ProviderConfig::default();
            fallback.apply_env(|key| std::env::var(key).ok());
            fallback
        }
    };
    if !provider_config.has_api_key() {
        tracing::warn!("NANO_BANANA_API_KEY non impostata: i job immagine falliranno con auth_failed");
    }

    let settings = Arc::new(SettingsStore::new(
        provider_config,
        Some(config.config_path.clone()),
    ));
    let store: SharedJobStore = Arc::new(JobStore::new());
    let provider: Arc<dyn ImageProvider> = Arc::new(GenAiClient::new());

    // Controllo di connettività in background, solo informativo
    let startup_settings = settings.clone();
    let startup_provider = provider.clone();
    tokio::spawn(async move {
        let report = startup_provider
            .check_connectivity(&startup_settings.snapshot())
            .await;
        if report.status == "ok" {
            tracing::info!("Provider raggiungibile: {}", report.message);
        } else {
            tracing::warn!("Provider non raggiungibile ({}): {}", report.status, report.message);
        }
    });

    // CORS layer - espone Content-Disposition per il download
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            axum::http::header::CONTENT_DISPOSITION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let api_routes = routes::create_router(store.clone(), settings, provider, &config);

    // Costruisci router completo con Swagger
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Avvia server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Indirizzo non valido");

    tracing::info!("========================================");
    tracing::info!("  Tinycraft API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("========================================");
    tracing::info!("Server: http://{}", addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", addr);
    tracing::info!("----------------------------------------");
    tracing::info!("Endpoints Jobs:");
    tracing::info!("  POST /api/jobs                 - Job modifica testo");
    tracing::info!("  POST /api/image/jobs           - Job modifica immagine");
    tracing::info!("  GET  /api/jobs/:id             - Stato job");
    tracing::info!("  GET  /api/jobs/:id/result      - Metadati risultato");
    tracing::info!("  GET  /api/jobs/:id/result/file - Scarica risultato");
    tracing::info!("  GET  /api/jobs/:id/events      - SSE eventi");
    tracing::info!("----------------------------------------");
    tracing::info!("Endpoints Sistema:");
    tracing::info!("  GET  /api/health               - Health check");
    tracing::info!("  GET  /api/health/connectivity  - Connettività provider");
    tracing::info!("  GET  /api/config               - Configurazione provider");
    tracing::info!("  POST /api/config               - Aggiorna configurazione");
    tracing::info!("----------------------------------------");

    // Task background per rimuovere i job terminati (ogni ora)
    let retention = config.job_retention();
    let cleanup_store = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            let removed = cleanup_store.purge_finished(retention).await;
            if removed > 0 {
                tracing::info!("Cleanup completato: {} job rimossi", removed);
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
