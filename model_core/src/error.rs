use thiserror::Error;

/// Startup configuration problems. Fatal to the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("{key} is not a valid http(s) URL: {value}")]
    InvalidUrl { key: &'static str, value: String },
}

/// Failures talking to a hosted model.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("credential rejected by the model hub (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("model {model} is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model {model} returned HTTP {status}: {body}")]
    Status {
        model: String,
        status: u16,
        body: String,
    },

    #[error("model {model} returned no results")]
    EmptyResult { model: String },

    #[error("unexpected response from {model}: {reason}")]
    Decode { model: String, reason: String },

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    /// True when the failure stems from the credential rather than the model.
    pub fn is_auth(&self) -> bool {
        matches!(self, InferenceError::Unauthorized { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("uploaded image is empty")]
    Empty,

    #[error("unsupported image format: {0} (only JPEG is accepted)")]
    UnsupportedFormat(String),

    #[error("failed to write image to a temporary file: {0}")]
    Io(#[from] std::io::Error),
}
