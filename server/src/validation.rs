use model_core::{ImageError, UploadedImage};

use crate::error::ApiError;

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";
/// File extensions accepted from the upload form
const ALLOWED_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// Validate an uploaded image and wrap it for the pipeline
pub fn validate_upload(
    file_name: Option<&str>,
    bytes: Vec<u8>,
    max_bytes: usize,
) -> Result<UploadedImage, ApiError> {
    if bytes.len() > max_bytes {
        return Err(ApiError::InvalidInput(format!(
            "Image too large (max {} bytes)",
            max_bytes
        )));
    }

    if let Some(name) = file_name {
        if !has_allowed_extension(name) {
            return Err(ApiError::InvalidInput(format!(
                "Unsupported file type: {}. Upload a JPG image",
                name
            )));
        }
    }

    UploadedImage::from_jpeg(bytes).map_err(|e| match e {
        ImageError::Empty => ApiError::InvalidInput("Image cannot be empty".to_string()),
        other => ApiError::InvalidInput(other.to_string()),
    })
}

/// Check the extension of an uploaded file name (case-insensitive)
fn has_allowed_extension(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}
