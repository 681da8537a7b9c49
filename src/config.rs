use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size_mb: u64,
    pub step_delay_ms: u64,
    pub job_retention_hours: u64,
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_file_size_mb: 50,
            step_delay_ms: 600,
            job_retention_hours: 24,
            config_path: PathBuf::from("config").join("app.yaml"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("TINYCRAFT_HOST") {
            config.host = host;
        }

        if let Ok(port) = std::env::var("TINYCRAFT_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        if let Ok(size) = std::env::var("TINYCRAFT_MAX_FILE_SIZE_MB") {
            if let Ok(s) = size.parse() {
                config.max_file_size_mb = s;
            }
        }

        if let Ok(delay) = std::env::var("TINYCRAFT_STEP_DELAY_MS") {
            if let Ok(d) = delay.parse() {
                config.step_delay_ms = d;
            }
        }

        if let Ok(hours) = std::env::var("TINYCRAFT_JOB_RETENTION_HOURS") {
            if let Ok(h) = hours.parse() {
                config.job_retention_hours = h;
            }
        }

        if let Ok(path) = std::env::var("TINYCRAFT_CONFIG_PATH") {
            config.config_path = PathBuf::from(path);
        }

        config
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_hours * 3600)
    }
}

/// Impostazioni del provider GenAI per la modifica delle immagini.
///
/// La API key non viene mai serializzata: non compare nelle risposte di
/// `/api/config` e non viene scritta nel file YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing)]
    pub nano_banana_api_key: Option<String>,
    pub nano_banana_model: String,
    pub nano_banana_base_url: Option<String>,
    /// Timeout richieste in secondi
    pub nano_banana_timeout: u64,
    pub nano_banana_max_images: usize,
    pub nano_banana_aspect_ratio: String,
    pub nano_banana_image_size: String,
    /// Lista separata da virgole, es. "TEXT,IMAGE"
    pub nano_banana_response_modalities: String,
    pub nano_banana_enable_search: bool,
    pub nano_banana_proxy: Option<String>,
    /// Usa i proxy di sistema (HTTP_PROXY, HTTPS_PROXY, ...)
    pub nano_banana_trust_env: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            nano_banana_api_key: None,
            nano_banana_model: "gemini-3-pro-image-preview".to_string(),
            nano_banana_base_url: None,
            nano_banana_timeout: 60,
            nano_banana_max_images: 14,
            nano_banana_aspect_ratio: "auto".to_string(),
            nano_banana_image_size: "1K".to_string(),
            nano_banana_response_modalities: "TEXT,IMAGE".to_string(),
            nano_banana_enable_search: false,
            nano_banana_proxy: None,
            nano_banana_trust_env: true,
        }
    }
}

/// Aggiornamento parziale della configurazione provider (POST /api/config)
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProviderConfigPatch {
    pub nano_banana_api_key: Option<String>,
    pub nano_banana_model: Option<String>,
    pub nano_banana_base_url: Option<String>,
    pub nano_banana_timeout: Option<u64>,
    pub nano_banana_max_images: Option<usize>,
    pub nano_banana_aspect_ratio: Option<String>,
    pub nano_banana_image_size: Option<String>,
    pub nano_banana_response_modalities: Option<String>,
    pub nano_banana_enable_search: Option<bool>,
    pub nano_banana_proxy: Option<String>,
    pub nano_banana_trust_env: Option<bool>,
}

impl ProviderConfig {
    /// Legge il file YAML (se esiste) e applica gli override da variabili d'ambiente
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Applica gli override `NANO_BANANA_*`; valori non interpretabili vengono ignorati
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NANO_BANANA_API_KEY") {
            self.nano_banana_api_key = Some(v);
        }
        if let Some(v) = lookup("NANO_BANANA_MODEL") {
            self.nano_banana_model = v;
        }
        if let Some(v) = lookup("NANO_BANANA_BASE_URL") {
            self.nano_banana_base_url = Some(v);
        }
        if let Some(v) = lookup("NANO_BANANA_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.nano_banana_timeout = v;
        }
        if let Some(v) = lookup("NANO_BANANA_MAX_IMAGES").and_then(|v| v.trim().parse().ok()) {
            self.nano_banana_max_images = v;
        }
        if let Some(v) = lookup("NANO_BANANA_ASPECT_RATIO") {
            self.nano_banana_aspect_ratio = v;
        }
        if let Some(v) = lookup("NANO_BANANA_IMAGE_SIZE") {
            self.nano_banana_image_size = v;
        }
        if let Some(v) = lookup("NANO_BANANA_RESPONSE_MODALITIES") {
            self.nano_banana_response_modalities = v;
        }
        if let Some(v) = lookup("NANO_BANANA_ENABLE_SEARCH") {
            self.nano_banana_enable_search = coerce_bool(&v);
        }
        if let Some(v) = lookup("NANO_BANANA_PROXY") {
            self.nano_banana_proxy = Some(v);
        }
        if let Some(v) = lookup("NANO_BANANA_TRUST_ENV") {
            self.nano_banana_trust_env = coerce_bool(&v);
        }
    }

    pub fn apply_patch(&mut self, patch: ProviderConfigPatch) {
        if let Some(v) = patch.nano_banana_api_key {
            self.nano_banana_api_key = Some(v);
        }
        if let Some(v) = patch.nano_banana_model {
            self.nano_banana_model = v;
        }
        if let Some(v) = patch.nano_banana_base_url {
            self.nano_banana_base_url = Some(v);
        }
        if let Some(v) = patch.nano_banana_timeout {
            self.nano_banana_timeout = v;
        }
        if let Some(v) = patch.nano_banana_max_images {
            self.nano_banana_max_images = v;
        }
        if let Some(v) = patch.nano_banana_aspect_ratio {
            self.nano_banana_aspect_ratio = v;
        }
        if let Some(v) = patch.nano_banana_image_size {
            self.nano_banana_image_size = v;
        }
        if let Some(v) = patch.nano_banana_response_modalities {
            self.nano_banana_response_modalities = v;
        }
        if let Some(v) = patch.nano_banana_enable_search {
            self.nano_banana_enable_search = v;
        }
        if let Some(v) = patch.nano_banana_proxy {
            self.nano_banana_proxy = Some(v);
        }
        if let Some(v) = patch.nano_banana_trust_env {
            self.nano_banana_trust_env = v;
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.nano_banana_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Numero massimo di immagini (principale + riferimenti) per il modello attivo
    pub fn max_images_for_model(&self) -> usize {
        let model = self.nano_banana_model.as_str();
        let model_limit = if model.starts_with(models::FLASH_IMAGE_PREFIX) {
            models::FLASH_IMAGE_LIMIT
        } else if model.starts_with(models::PRO_IMAGE_PREFIX) {
            models::PRO_IMAGE_LIMIT
        } else {
            self.nano_banana_max_images
        };
        model_limit.min(self.nano_banana_max_images).max(1)
    }

    pub fn supports_image_size(&self) -> bool {
        self.nano_banana_model.starts_with(models::PRO_IMAGE_PREFIX)
    }
}

fn coerce_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configurazione provider condivisa tra le route, con persistenza opzionale su file
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<ProviderConfig>,
}

pub type SharedSettings = Arc<SettingsStore>;

impl SettingsStore {
    pub fn new(config: ProviderConfig, path: Option<PathBuf>) -> Self {
        Self {
            path,
            current: RwLock::new(config),
        }
    }

    pub fn snapshot(&self) -> ProviderConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applica la patch e la rende persistente (la API key resta solo in memoria)
    pub fn update(&self, patch: ProviderConfigPatch) -> Result<ProviderConfig> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = current.clone();
        updated.apply_patch(patch);
        if let Some(path) = &self.path {
            updated.save(path)?;
        }
        *current = updated.clone();
        Ok(updated)
    }
}

// Limiti immagini per famiglia di modelli
pub mod models {
    pub const FLASH_IMAGE_PREFIX: &str = "gemini-2.5-flash-image";
    pub const FLASH_IMAGE_LIMIT: usize = 3;

    pub const PRO_IMAGE_PREFIX: &str = "gemini-3-pro-image";
    pub const PRO_IMAGE_LIMIT: usize = 14;
}
