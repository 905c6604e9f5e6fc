use axum::{Json, extract::multipart::MultipartError, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::artifacts::ArtifactError;
use crate::encoding::{EncodeError, ProbeError};
use crate::forward::ForwardError;
use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Launch(String),
    #[error("{0}")]
    EncodeFailed(String),
    #[error("forward failed: {0}")]
    Forward(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Launch(_)
            | ApiError::EncodeFailed(_)
            | ApiError::Forward(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Launch(_) => "PROCESS_LAUNCH_FAILED",
            ApiError::EncodeFailed(_) => "ENCODE_FAILED",
            ApiError::Forward(_) => "FORWARD_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(value: MultipartError) -> Self {
        if value.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(value.body_text())
        } else {
            ApiError::InvalidPayload(value.body_text())
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::Forward(e) if e.is_client_error() => ApiError::InvalidPayload(e.to_string()),
            PipelineError::Forward(e) => ApiError::Forward(e.to_string()),
            PipelineError::Encode(e @ EncodeError::Launch { .. }) => ApiError::Launch(e.to_string()),
            PipelineError::Probe(e @ ProbeError::Launch { .. }) => ApiError::Launch(e.to_string()),
            e @ PipelineError::EncodeFailed { .. } => ApiError::EncodeFailed(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(value: ArtifactError) -> Self {
        PipelineError::from(value).into()
    }
}

impl From<ForwardError> for ApiError {
    fn from(value: ForwardError) -> Self {
        PipelineError::from(value).into()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(value: std::io::Error) -> Self {
        PipelineError::from(value).into()
    }
}
