// Uploaded image bytes and their on-disk form

use std::io::Write;

use image::ImageFormat;
use tempfile::NamedTempFile;

use crate::error::ImageError;

/// Raw bytes of a user upload. Only JPEG is accepted.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn from_jpeg(bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        match image::guess_format(&bytes) {
            Ok(ImageFormat::Jpeg) => Ok(Self { bytes }),
            Ok(other) => Err(ImageError::UnsupportedFormat(format!("{:?}", other))),
            Err(_) => Err(ImageError::UnsupportedFormat("unknown".to_string())),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the bytes to a `.jpg` temp file. The file is removed when the
    /// returned handle is dropped.
    pub fn materialize(&self) -> Result<NamedTempFile, ImageError> {
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".jpg")
            .tempfile()?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        Ok(file)
    }
}
