//! OpenAI-compatible transcription and summarization backends

pub mod summarization;
pub mod transcription;

pub use summarization::OpenAiSummarizationService;
pub use transcription::OpenAiTranscriptionService;

use crate::config::OpenAiConfig;
use crate::error::{StageError, StageErrorCode};
use std::time::Duration;

const USER_AGENT: &str = concat!("tldw-ps/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by one backend
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, StageError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| {
            StageError::new(
                StageErrorCode::Internal,
                format!("Failed to build HTTP client: {}", e),
            )
        })
}

/// The configured API key, or a resource error naming how to set one
pub(crate) fn require_api_key(config: &OpenAiConfig) -> Result<&str, StageError> {
    config.api_key.as_deref().ok_or_else(|| {
        StageError::new(
            StageErrorCode::ResourceUnavailable,
            "OpenAI API key not configured (set TLDW_OPENAI_API_KEY)",
        )
    })
}

/// Send a request and turn transport / status failures into classified errors
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
    fallback: StageErrorCode,
) -> Result<reqwest::Response, StageError> {
    let response = request
        .send()
        .await
        .map_err(|e| StageError::from_reqwest(StageErrorCode::Network, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let code = StageErrorCode::from_status(status).unwrap_or(fallback);

    tracing::warn!(
        http_status = status.as_u16(),
        body = %body.chars().take(500).collect::<String>(),
        "Upstream API error"
    );

    Err(StageError::new(code, format!("Upstream API returned {}", status))
        .with_detail("http_status", status.as_u16()))
}
