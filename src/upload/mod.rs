//! Upload module - Decoding and validation of submitted images

pub mod base64;
pub mod validation;

pub use validation::{
    decode_upload, detect_image_format, validate_file_size,
    validate_magic_bytes, validate_mime_type, validate_uploaded_file, DecodedUpload,
    ALLOWED_IMAGE_TYPES, DEFAULT_MAX_FILE_SIZE,
};
