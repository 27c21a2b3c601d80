//! Error types for the receipt scanner server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNPARSEABLE_MESSAGE: &str =
    "Could not parse receipt. Please try another image or try again later.";
pub const INTERNAL_MESSAGE: &str = "Failed to process receipt. Please try again.";
pub const MISCONFIGURED_MESSAGE: &str = "Server not configured for receipt scanning";
pub const UNAVAILABLE_MESSAGE: &str =
    "AI models are unavailable or over quota. Please try again later or contact support.";
pub const UNAVAILABLE_HINT: &str =
    "The model quota may have been exceeded. Consider upgrading the API plan.";

/// Classified scan failure. Every failure path of the extraction service ends here.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Caller fixable: resubmit correctly
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Operator fixable: server setup is incomplete
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    /// Every backend failed and no fallback record is available
    #[error("All model backends failed")]
    BackendUnavailable,

    /// The backend answered with something that is not JSON
    #[error("Unparseable backend response")]
    UnparseableResponse,

    /// Catch-all infrastructure fault. `detail` is only set outside production.
    #[error("Internal failure")]
    InternalFailure { detail: Option<String> },
}

impl ScanError {
    pub fn internal(detail: impl Into<String>, expose: bool) -> Self {
        let detail = detail.into();
        tracing::error!("Error scanning receipt: {}", truncate(&detail, 200));
        Self::InternalFailure {
            detail: expose.then_some(detail),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UnparseableResponse => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable => StatusCode::TOO_MANY_REQUESTS,
            Self::Misconfigured(_) | Self::InternalFailure { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            hint: None,
            detail: None,
        }
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ScanError::BadRequest(msg) => ErrorResponse::new(msg),
            ScanError::Misconfigured(msg) => {
                tracing::error!("Scan service misconfigured: {}", msg);
                ErrorResponse::new(MISCONFIGURED_MESSAGE)
            }
            ScanError::BackendUnavailable => ErrorResponse {
                error: UNAVAILABLE_MESSAGE.to_string(),
                hint: Some(UNAVAILABLE_HINT.to_string()),
                detail: None,
            },
            ScanError::UnparseableResponse => ErrorResponse::new(UNPARSEABLE_MESSAGE),
            ScanError::InternalFailure { detail } => ErrorResponse {
                error: INTERNAL_MESSAGE.to_string(),
                hint: None,
                detail,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Truncate to at most `max` characters on a char boundary
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
