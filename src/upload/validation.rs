//! Size, type and content checks for uploaded images

use tracing::debug;

use crate::error::{AppError, Result};
use crate::upload::base64;

/// MIME types accepted for uploads
pub const ALLOWED_IMAGE_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// 10 MB
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

const FALLBACK_MIME: &str = "image/png";

/// A decoded upload that passed validation
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for DecodedUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedUpload")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

pub fn validate_file_size(len: usize, max: usize) -> Result<()> {
    if len > max {
        let max_mb = max as f64 / 1024.0 / 1024.0;
        return Err(AppError::InvalidInput(format!(
            "File size exceeds maximum allowed size of {}MB",
            max_mb
        )));
    }
    Ok(())
}

pub fn validate_mime_type(mime_type: &str) -> Result<()> {
    if !ALLOWED_IMAGE_TYPES.contains(&mime_type) {
        return Err(AppError::InvalidInput(format!(
            "Invalid file type. Allowed types: {}",
            ALLOWED_IMAGE_TYPES.join(", ")
        )));
    }
    Ok(())
}

/// Check the leading bytes against the declared type.
///
/// Only jpeg, png and webp have a known signature; other allowed types pass.
pub fn validate_magic_bytes(data: &[u8], mime_type: &str) -> Result<()> {
    let signature: &[u8] = match mime_type {
        "image/jpeg" => &[0xFF, 0xD8, 0xFF],
        "image/png" => &[0x89, 0x50, 0x4E, 0x47],
        "image/webp" => b"RIFF",
        _ => return Ok(()),
    };

    if !data.starts_with(signature) {
        return Err(AppError::InvalidInput(
            "File content does not match declared MIME type".to_string(),
        ));
    }
    Ok(())
}

/// Size, then type, then content
pub fn validate_uploaded_file(data: &[u8], mime_type: &str, max_size: usize) -> Result<()> {
    validate_file_size(data.len(), max_size)?;
    validate_mime_type(mime_type)?;
    validate_magic_bytes(data, mime_type)
}

/// Detect image MIME type from binary data using magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.len() < 4 {
        return None;
    }

    // PNG: 89 50 4E 47
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    // HEIF family: ....ftypheic / ftypheix / ftypmif1
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            b"heic" | b"heix" => Some("image/heic"),
            b"mif1" | b"msf1" => Some("image/heif"),
            _ => None,
        };
    }

    None
}

/// Registered name for accepted aliases; `image/jpg` is not understood upstream
fn canonical_mime(mime_type: &str) -> &str {
    match mime_type {
        "image/jpg" => "image/jpeg",
        other => other,
    }
}

/// Decode an uploaded image string (plain base64 or a data URI) and validate it.
///
/// Without a declared type the format is sniffed from the content, falling
/// back to png.
pub fn decode_upload(input: &str, max_size: usize) -> Result<DecodedUpload> {
    if input.trim().is_empty() {
        return Err(AppError::InvalidInput("No image data provided".to_string()));
    }

    let (declared, _) = base64::split_data_uri(input);
    let declared = declared.map(str::to_ascii_lowercase);
    let bytes = base64::decode(input)?;
    if bytes.is_empty() {
        return Err(AppError::InvalidInput("No image data provided".to_string()));
    }

    let mime_type = declared.unwrap_or_else(|| {
        detect_image_format(&bytes)
            .unwrap_or(FALLBACK_MIME)
            .to_string()
    });
    validate_uploaded_file(&bytes, &mime_type, max_size)?;
    let mime_type = canonical_mime(&mime_type).to_string();

    debug!(bytes = bytes.len(), mime_type = %mime_type, "Upload accepted");
    Ok(DecodedUpload { bytes, mime_type })
}
