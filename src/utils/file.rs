pub fn get_mime_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

/// Riconosce il formato dai magic bytes; `None` se non è un'immagine nota
pub fn sniff_image_mime(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data).ok().map(|format| format.to_mime_type())
}

/// Valore dell'header `Content-Disposition` per il download.
///
/// Il parametro `filename` contiene solo ASCII stampabile (gli altri caratteri
/// diventano `_`), `filename*` porta il nome completo codificato in UTF-8.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if (' '..='~').contains(&c) => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}
