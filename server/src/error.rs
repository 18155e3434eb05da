use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use model_core::{ImageError, InferenceError};
use serde::Serialize;
use thiserror::Error;
use tts_core::SpeechError;

use crate::pipeline::{PipelineError, Stage};

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Upload(ImageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Upload(_) => StatusCode::BAD_REQUEST,
        PipelineError::Describe(InferenceError::Io(_))
        | PipelineError::Generate(InferenceError::Io(_))
        | PipelineError::Synthesize(SpeechError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Describe(InferenceError::Request(e))
        | PipelineError::Generate(InferenceError::Request(e))
        | PipelineError::Synthesize(SpeechError::Network(e))
            if e.is_timeout() =>
        {
            StatusCode::GATEWAY_TIMEOUT
        }
        // Everything else is an upstream model/endpoint failure.
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, stage) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Pipeline(e) => {
                let status = pipeline_status(&e);
                tracing::error!(stage = ?e.stage(), "Pipeline error: {}", e);
                (status, e.to_string(), Some(e.stage()))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
            stage,
        });

        (status, body).into_response()
    }
}
