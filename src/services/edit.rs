//! Operazioni di modifica eseguite dal runner dopo le milestone di avanzamento

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ProviderConfig;
use crate::models::JobKind;
use crate::services::genai::{ImageEditRequest, ImageProvider};

/// Errore opaco di un'operazione; la catena delle cause viene classificata dal runner
pub type OperationError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub data: Bytes,
    pub mime: Option<String>,
}

#[async_trait]
pub trait EditOperation: Send {
    fn kind(&self) -> JobKind;

    async fn execute(self: Box<Self>) -> Result<EditOutcome, OperationError>;
}

/// Sostituisce i caratteri `[start, end)` con `replacement`.
///
/// Gli indici contano caratteri Unicode. Se il contenuto non è UTF-8 o
/// l'intervallo non è valido restituisce il contenuto invariato.
pub fn apply_edit(content: &[u8], start: usize, end: usize, replacement: &str) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(content) else {
        return content.to_vec();
    };
    if start > end {
        return content.to_vec();
    }

    let mut boundaries = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let Some(start_byte) = boundaries.nth(start) else {
        return content.to_vec();
    };
    let end_byte = if end == start {
        Some(start_byte)
    } else {
        boundaries.nth(end - start - 1)
    };
    let Some(end_byte) = end_byte else {
        return content.to_vec();
    };

    let mut edited = String::with_capacity(text.len() - (end_byte - start_byte) + replacement.len());
    edited.push_str(&text[..start_byte]);
    edited.push_str(replacement);
    edited.push_str(&text[end_byte..]);
    edited.into_bytes()
}

#[derive(Debug, Clone)]
pub struct TextEdit {
    content: Bytes,
    region: Range<usize>,
    description: String,
}

impl TextEdit {
    pub fn new(content: Bytes, region: Range<usize>, description: String) -> Self {
        Self {
            content,
            region,
            description,
        }
    }
}

#[async_trait]
impl EditOperation for TextEdit {
    fn kind(&self) -> JobKind {
        JobKind::Text
    }

    async fn execute(self: Box<Self>) -> Result<EditOutcome, OperationError> {
        let edited = apply_edit(
            &self.content,
            self.region.start,
            self.region.end,
            &self.description,
        );
        Ok(EditOutcome {
            data: Bytes::from(edited),
            mime: None,
        })
    }
}

/// Modifica immagine delegata al provider, con la configurazione fissata all'invio
pub struct ImageEdit {
    provider: Arc<dyn ImageProvider>,
    config: ProviderConfig,
    request: ImageEditRequest,
}

impl ImageEdit {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        config: ProviderConfig,
        request: ImageEditRequest,
    ) -> Self {
        Self {
            provider,
            config,
            request,
        }
    }
}

#[async_trait]
impl EditOperation for ImageEdit {
    fn kind(&self) -> JobKind {
        JobKind::Image
    }

    async fn execute(self: Box<Self>) -> Result<EditOutcome, OperationError> {
        let edited = self.provider.edit_image(&self.config, &self.request).await?;
        Ok(EditOutcome {
            data: edited.data,
            mime: Some(edited.mime.unwrap_or_else(|| "image/png".to_string())),
        })
    }
}
