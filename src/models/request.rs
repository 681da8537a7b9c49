use bytes::Bytes;

/// File ricevuto da un campo multipart
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// Campi del form multipart di POST /api/jobs
#[derive(Debug, Default)]
pub struct TextJobForm {
    pub file: Option<UploadedFile>,
    pub region_start: Option<i64>,
    pub region_end: Option<i64>,
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}

/// Campi del form multipart di POST /api/image/jobs
#[derive(Debug, Default)]
pub struct ImageJobForm {
    pub image: Option<UploadedFile>,
    pub references: Vec<UploadedFile>,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub region_x: Option<i64>,
    pub region_y: Option<i64>,
    pub region_width: Option<i64>,
    pub region_height: Option<i64>,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}

/// Rettangolo da modificare, in pixel dall'angolo in alto a sinistra
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageRegion {
    /// Istruzione aggiunta al prompt per limitare la modifica alla regione
    pub fn prompt_hint(&self) -> String {
        format!(
            "\n\nOnly edit the rectangle region (x={}, y={}, width={}, height={}) \
             in pixels from the top-left corner. Keep all other areas unchanged.",
            self.x, self.y, self.width, self.height
        )
    }
}
