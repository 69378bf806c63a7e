use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::inference::InferenceError;
use crate::storage::media_store::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Worker failure: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) | ApiError::Storage(StorageError::Empty) => "bad_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::Storage(_) => "storage_error",
            ApiError::Inference(InferenceError::Decode(_)) => "decode_error",
            ApiError::Inference(InferenceError::ModelLoad(_)) => "model_unavailable",
            ApiError::Inference(InferenceError::Inference(_)) => "inference_error",
            ApiError::Inference(InferenceError::Timeout(_)) => "timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Storage(StorageError::Empty) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Inference(InferenceError::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Inference(InferenceError::ModelLoad(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(InferenceError::Inference(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Inference(InferenceError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
        })
    }
}
