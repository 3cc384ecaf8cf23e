use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::session::controller::DetectError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unsupported upload format")]
    UnsupportedMedia,

    #[error("Uploaded file is too large")]
    FileTooLarge,

    #[error("Malformed request payload: {0}")]
    Payload(String),

    #[error("No detection result for this session")]
    NoCurrentResult,

    #[error("Internal error")]
    Internal,
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::InvalidImage(e) => ApiError::InvalidImage(e.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({ "error": self.to_string() });
        match self {
            ApiError::InvalidImage(_) | ApiError::Payload(_) => {
                HttpResponse::BadRequest().json(body)
            }
            ApiError::UnsupportedMedia => HttpResponse::UnsupportedMediaType().json(body),
            ApiError::FileTooLarge => HttpResponse::PayloadTooLarge().json(body),
            ApiError::NoCurrentResult => HttpResponse::NotFound().json(body),
            ApiError::Internal => HttpResponse::InternalServerError().json(body),
        }
    }
}
