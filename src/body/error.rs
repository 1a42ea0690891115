//! Body reader errors.

use std::string::FromUtf8Error;

use axum::http::StatusCode;

use crate::http::error::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body already consumed")]
    AlreadyConsumed,
    #[error("unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },
    #[error("request entity too large (limit {limit} bytes)")]
    TooLarge { limit: usize },
    #[error("malformed JSON body: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("request body is not valid UTF-8: {0}")]
    InvalidText(#[source] FromUtf8Error),
    #[error("failed to read request body: {0}")]
    Io(#[source] BoxError),
}

impl BodyError {
    /// Status for errors that surface as tagged failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BodyError::AlreadyConsumed => Some(StatusCode::BAD_REQUEST),
            BodyError::UnsupportedMediaType { .. } => Some(StatusCode::UNSUPPORTED_MEDIA_TYPE),
            BodyError::TooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            BodyError::Malformed(_) | BodyError::InvalidText(_) | BodyError::Io(_) => None,
        }
    }

    /// Wire code used in the default error response.
    pub fn code(&self) -> &'static str {
        match self {
            BodyError::AlreadyConsumed => "body_already_consumed",
            BodyError::UnsupportedMediaType { .. } => "unsupported_media_type",
            BodyError::TooLarge { .. } => "entity_too_large",
            BodyError::Malformed(_) => "malformed_body",
            BodyError::InvalidText(_) => "invalid_text",
            BodyError::Io(_) => "body_read_failed",
        }
    }
}
