//! Validazione sincrona delle richieste, eseguita prima di creare il job

use crate::error::{AppError, Result};
use crate::models::{ImageRegion, UploadedFile};
use crate::utils::file::sniff_image_mime;

/// Intervallo `[start, end)` in caratteri; estremi negativi o invertiti sono rifiutati
pub fn validate_text_region(start: i64, end: i64) -> Result<(usize, usize)> {
    if start < 0 || end < 0 {
        return Err(AppError::BadRequest(
            "Gli estremi della regione non possono essere negativi".to_string(),
        ));
    }
    if end < start {
        return Err(AppError::BadRequest(
            "Intervallo regione non valido: region_end < region_start".to_string(),
        ));
    }
    Ok((start as usize, end as usize))
}

pub fn decode_utf8(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| {
        AppError::UnsupportedMediaType("Sono supportati solo file di testo UTF-8".to_string())
    })
}

pub fn validate_region_within(text: &str, end: usize) -> Result<()> {
    if end > text.chars().count() {
        return Err(AppError::BadRequest(
            "La regione supera la lunghezza del file".to_string(),
        ));
    }
    Ok(())
}

/// Richiede un content type `image/*`; senza content type (o con
/// `application/octet-stream`) decidono i magic bytes
pub fn validate_image_upload(file: &UploadedFile) -> Result<()> {
    let accepted = match file.content_type.as_deref() {
        Some(_) if file.is_image() => true,
        None | Some("application/octet-stream") => sniff_image_mime(&file.data).is_some(),
        Some(_) => false,
    };
    if accepted {
        return Ok(());
    }
    Err(AppError::UnsupportedMediaType(
        "Sono supportati solo upload di immagini".to_string(),
    ))
}

/// Regione immagine: assente se nessun campo è presente, altrimenti tutti e
/// quattro i campi sono obbligatori, con x,y >= 0 e dimensioni > 0
pub fn parse_image_region(
    x: Option<i64>,
    y: Option<i64>,
    width: Option<i64>,
    height: Option<i64>,
) -> Result<Option<ImageRegion>> {
    let (x, y, width, height) = match (x, y, width, height) {
        (None, None, None, None) => return Ok(None),
        (Some(x), Some(y), Some(w), Some(h)) => (x, y, w, h),
        _ => {
            return Err(AppError::BadRequest(
                "La regione richiede region_x, region_y, region_width e region_height".to_string(),
            ))
        }
    };

    if x < 0 || y < 0 || width <= 0 || height <= 0 {
        return Err(AppError::BadRequest(
            "Regione immagine non valida: x,y >= 0 e dimensioni > 0".to_string(),
        ));
    }

    let to_u32 = |v: i64| {
        u32::try_from(v).map_err(|_| AppError::BadRequest("Regione immagine troppo grande".to_string()))
    };

    Ok(Some(ImageRegion {
        x: to_u32(x)?,
        y: to_u32(y)?,
        width: to_u32(width)?,
        height: to_u32(height)?,
    }))
}

pub fn validate_image_count(total: usize, max: usize) -> Result<()> {
    if total > max {
        return Err(AppError::BadRequest(format!(
            "Troppe immagini: {} > {}",
            total, max
        )));
    }
    Ok(())
}
