//! Base64 and data URI helpers for uploaded and generated images

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64 string to binary data, accepting a `data:` URI
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let (_, payload) = split_data_uri(encoded);

    STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid base64 data: {}", e)))
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload.
///
/// Plain base64 comes back unchanged with no MIME type.
pub fn split_data_uri(input: &str) -> (Option<&str>, &str) {
    let Some(rest) = input.strip_prefix("data:") else {
        return (None, input);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header
                .split(';')
                .next()
                .map(str::trim)
                .filter(|m| !m.is_empty());
            (mime, payload)
        }
        None => (None, input),
    }
}

/// Create a data URI from binary image data
pub fn create_data_url(data: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, encode(data))
}
