use std::error::Error as StdError;
use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use image::ImageError;
use kernel::ErrorReply;
use thiserror::Error;

use crate::retry::{classify_io, Classify, ErrorClass};
use crate::transform::OutputFormat;

/// Failures of the decode → resize → encode stage.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("Unsupported or corrupt image: {0}")]
    Decode(#[source] ImageError),

    #[error("{format} encoding failed: {source}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: ImageError,
    },

    #[error("Image I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Image worker stopped: {0}")]
    Worker(String),
}

impl TransformError {
    pub(crate) fn decode(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => Self::Io(io),
            other => Self::Decode(other),
        }
    }

    pub(crate) fn encode(format: OutputFormat, e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => Self::Io(io),
            source => Self::Encode { format, source },
        }
    }
}

impl Classify for TransformError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Io(e) => classify_io(e),
            _ => ErrorClass::Permanent,
        }
    }
}

/// Failures of the temp directory writer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Insufficient disk space for file storage")]
    Full(#[source] io::Error),

    #[error("Failed to create temporary directory")]
    Directory(#[source] io::Error),

    #[error("Failed to save compressed image")]
    Write(#[source] io::Error),

    #[error("Invalid storage file name: {0}")]
    InvalidName(String),

    #[error("Storage file already exists: {0}")]
    Exists(String),
}

impl StorageError {
    /// Wraps a write failure, keeping disk exhaustion apart from other I/O errors.
    #[must_use]
    pub fn from_write(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::StorageFull {
            Self::Full(e)
        } else {
            Self::Write(e)
        }
    }
}

/// Everything a request can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Processing(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    FileTooLarge(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Processing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(StorageError::Full(_)) => StatusCode::INSUFFICIENT_STORAGE,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Processing(_) => "PROCESSING_ERROR",
            Self::Storage(StorageError::Full(_)) => "STORAGE_FULL",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::FileTooLarge(_) => "FILE_TOO_LARGE",
            Self::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<TransformError> for AppError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::InvalidParams(message) => Self::Validation(message),
            other => Self::Processing(other.to_string()),
        }
    }
}

/// An [`AppError`] bound to the request it happened in.
#[derive(Debug)]
pub struct ApiError {
    pub request_id: String,
    pub error: AppError,
}

impl ApiError {
    #[must_use]
    pub fn new(request_id: impl Into<String>, error: impl Into<AppError>) -> Self {
        Self {
            request_id: request_id.into(),
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let code = self.error.code();
        let chain = error_chain(&self.error);
        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error_code = code, status = status.as_u16(), error = %chain, "request failed");
        } else {
            tracing::warn!(request_id = %self.request_id, error_code = code, status = status.as_u16(), error = %chain, "request rejected");
        }

        let body = ErrorReply {
            success: false,
            message: self.error.to_string(),
            error_code: code.to_owned(),
            request_id: self.request_id,
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

fn error_chain(e: &dyn StdError) -> String {
    let mut chain = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
