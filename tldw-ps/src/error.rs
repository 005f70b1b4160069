//! Error types for tldw-ps
//!
//! Three layers:
//! - [`StageError`]: classified failure from a stage collaborator, with a stable code
//! - [`PipelineError`]: what the orchestrator returns (stage error or retry give-up)
//! - [`ApiError`]: HTTP-facing error rendered as `{"error": {"code", "message"}}`

use crate::utils::retry::{RetryError, Transient};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tldw_common::events::GENERIC_ERROR_MESSAGE;

/// Stable machine-readable failure codes for stage collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageErrorCode {
    /// Source payload is malformed (bad URL, missing file)
    InvalidSource,
    /// File type not accepted
    UnsupportedFormat,
    /// Media exceeds the configured size limit
    MediaTooLarge,
    /// Media exists but cannot be fetched (private, removed, region locked)
    MediaUnavailable,
    /// Downloader exited unsuccessfully
    DownloadFailed,
    /// Required local resource missing (tool not installed, directory not writable)
    ResourceUnavailable,
    /// Connection or I/O level failure talking to a remote service
    Network,
    /// Remote service asked us to slow down (HTTP 429)
    RateLimited,
    /// Remote service failed (HTTP 5xx)
    UpstreamUnavailable,
    /// Remote service rejected the request (HTTP 4xx other than 429)
    UpstreamRejected,
    TranscriptionFailed,
    SummarizationFailed,
    Internal,
}

impl StageErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StageErrorCode::InvalidSource => "INVALID_SOURCE",
            StageErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            StageErrorCode::MediaTooLarge => "MEDIA_TOO_LARGE",
            StageErrorCode::MediaUnavailable => "MEDIA_UNAVAILABLE",
            StageErrorCode::DownloadFailed => "DOWNLOAD_FAILED",
            StageErrorCode::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
            StageErrorCode::Network => "NETWORK_ERROR",
            StageErrorCode::RateLimited => "RATE_LIMITED",
            StageErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            StageErrorCode::UpstreamRejected => "UPSTREAM_REJECTED",
            StageErrorCode::TranscriptionFailed => "TRANSCRIPTION_FAILED",
            StageErrorCode::SummarizationFailed => "SUMMARIZATION_FAILED",
            StageErrorCode::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether a retry might succeed
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StageErrorCode::Network
                | StageErrorCode::RateLimited
                | StageErrorCode::UpstreamUnavailable
                | StageErrorCode::DownloadFailed
        )
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            StageErrorCode::InvalidSource => StatusCode::BAD_REQUEST,
            StageErrorCode::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            StageErrorCode::MediaTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            StageErrorCode::MediaUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
            StageErrorCode::DownloadFailed
            | StageErrorCode::Network
            | StageErrorCode::RateLimited
            | StageErrorCode::UpstreamUnavailable
            | StageErrorCode::UpstreamRejected
            | StageErrorCode::TranscriptionFailed
            | StageErrorCode::SummarizationFailed => StatusCode::BAD_GATEWAY,
            StageErrorCode::ResourceUnavailable | StageErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl StageErrorCode {
    /// Code for a failed upstream HTTP status; `None` for non-error statuses
    pub fn from_status(status: reqwest::StatusCode) -> Option<Self> {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Some(StageErrorCode::RateLimited)
        } else if status.is_server_error() {
            Some(StageErrorCode::UpstreamUnavailable)
        } else if status.is_client_error() {
            Some(StageErrorCode::UpstreamRejected)
        } else {
            None
        }
    }
}

impl std::fmt::Display for StageErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure from a media, transcription or summarization collaborator
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct StageError {
    pub code: StageErrorCode,
    pub message: String,
    /// Structured context (exit codes, HTTP status, paths)
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl StageError {
    pub fn new(code: StageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(code: StageErrorCode, err: &reqwest::Error) -> Self {
        let code = match err.status().and_then(StageErrorCode::from_status) {
            Some(code) => code,
            None if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() => {
                StageErrorCode::Network
            }
            None => code,
        };

        let mut error = Self::new(code, err.to_string());
        if let Some(status) = err.status() {
            error = error.with_detail("http_status", status.as_u16());
        }
        error
    }
}

impl Transient for StageError {
    fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

/// Failure returned by the pipeline orchestrator
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Retry(#[from] RetryError<StageError>),
}

impl PipelineError {
    /// Stable code for clients and progress events
    ///
    /// Exhausted retries keep the last underlying code; a blown retry budget is
    /// reported as `RETRY_TIMEOUT`.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Stage(err) => err.code.as_str(),
            PipelineError::Retry(RetryError::Exhausted { last_error, .. }) => {
                last_error.code.as_str()
            }
            PipelineError::Retry(RetryError::TimedOut { .. }) => "RETRY_TIMEOUT",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Stage(err) => err.code.status_code(),
            PipelineError::Retry(RetryError::Exhausted { last_error, .. }) => {
                last_error.code.status_code()
            }
            PipelineError::Retry(RetryError::TimedOut { .. }) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Underlying stage error, if any
    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            PipelineError::Stage(err) => Some(err),
            PipelineError::Retry(RetryError::Exhausted { last_error, .. }) => Some(last_error),
            PipelineError::Retry(RetryError::TimedOut { last_error, .. }) => last_error.as_ref(),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload exceeds limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Admission refused (503)
    #[error("Server at capacity: {0}")]
    CapacityExceeded(String),

    /// Request timeout elapsed before the response started (408)
    #[error("Request timed out after {0} seconds")]
    RequestTimeout(u64),

    /// Pipeline failure
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// tldw-common error
    #[error("Common error: {0}")]
    Common(#[from] tldw_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::CapacityExceeded(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CAPACITY_EXCEEDED", msg)
            }
            ApiError::RequestTimeout(secs) => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                format!("Request timed out after {} seconds", secs),
            ),
            ApiError::Pipeline(ref err) => {
                let status = err.status_code();
                // Client-side problems are worth explaining; everything else stays generic
                let message = match err.stage_error() {
                    Some(stage) if status.is_client_error() => stage.message.clone(),
                    _ => GENERIC_ERROR_MESSAGE.to_string(),
                };
                (status, err.code(), message)
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    GENERIC_ERROR_MESSAGE.to_string(),
                )
            }
            ApiError::Io(ref err) => {
                tracing::error!("IO error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    GENERIC_ERROR_MESSAGE.to_string(),
                )
            }
            ApiError::Common(tldw_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => {
                tracing::error!("Common error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    GENERIC_ERROR_MESSAGE.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
