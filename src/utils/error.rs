use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Upload rejected before any parsing: wrong type, empty, missing field or oversize
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// Capture exceeds the configured size ceiling
    #[error("Capture is {size} bytes, the limit is {limit} bytes")]
    CaptureTooLarge { size: usize, limit: usize },

    /// Global header, record header or link type could not be decoded
    #[error("Malformed capture: {0}")]
    MalformedCapture(String),

    /// Magic bytes match neither legacy pcap nor pcap-ng
    #[error("Unsupported capture format (magic {0})")]
    UnsupportedFormat(String),

    /// The analysis did not finish within the orchestrator timeout
    #[error("Analysis timed out after {0} seconds")]
    Timeout(u64),

    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unexpected fault
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;

/// Body sent with every non-200 response
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error_kind: &'static str,
    pub message: String,
}

impl AppError {
    /// Stable name of the error class, as reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidUpload(_) => "InvalidUpload",
            AppError::CaptureTooLarge { .. } => "CaptureTooLarge",
            AppError::MalformedCapture(_) => "MalformedCapture",
            AppError::UnsupportedFormat(_) => "UnsupportedFormat",
            AppError::Timeout(_) => "Timeout",
            AppError::IoError(_) | AppError::JsonError(_) | AppError::InternalError(_) => {
                "InternalError"
            }
        }
    }

    /// Message safe to hand to an untrusted caller
    pub fn public_message(&self) -> String {
        match self.kind() {
            "InternalError" => "The capture could not be analyzed due to an internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidUpload(_) | AppError::CaptureTooLarge { .. } => StatusCode::BAD_REQUEST,
            AppError::MalformedCapture(_) | AppError::UnsupportedFormat(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::IoError(_) | AppError::JsonError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorEnvelope {
            error_kind: self.kind(),
            message: self.public_message(),
        })
    }
}
