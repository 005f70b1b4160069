//! Summarization via `POST {api_base}/chat/completions`

use super::{build_http_client, require_api_key, send_checked};
use crate::config::OpenAiConfig;
use crate::error::{StageError, StageErrorCode};
use crate::models::{SourceKind, Summary, SummaryOptions, Transcript};
use crate::services::stage::SummarizationService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = "You write concise, faithful summaries of transcribed videos and \
audio recordings. Use only information present in the transcript.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions summarizer
pub struct OpenAiSummarizationService {
    http_client: reqwest::Client,
    config: OpenAiConfig,
    default_max_words: usize,
}

impl OpenAiSummarizationService {
    pub fn new(config: OpenAiConfig, default_max_words: usize) -> Result<Self, StageError> {
        Ok(Self {
            http_client: build_http_client(REQUEST_TIMEOUT)?,
            config,
            default_max_words,
        })
    }
}

/// User prompt for one transcript
fn build_prompt(transcript: &str, max_words: usize, additional_prompt: Option<&str>) -> String {
    let mut prompt = format!(
        "Summarize the following transcript in at most {} words.",
        max_words
    );

    if let Some(extra) = additional_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\nAdditional instructions: ");
        prompt.push_str(extra);
    }

    prompt.push_str("\n\nTranscript:\n");
    prompt.push_str(transcript);
    prompt
}

#[async_trait]
impl SummarizationService for OpenAiSummarizationService {
    async fn summarize(
        &self,
        transcript: &Transcript,
        options: &SummaryOptions,
        source_type: SourceKind,
        source_id: &str,
    ) -> Result<Summary, StageError> {
        let api_key = require_api_key(&self.config)?;

        if transcript.text.trim().is_empty() {
            return Err(StageError::new(
                StageErrorCode::SummarizationFailed,
                "Transcript is empty",
            ));
        }

        let max_words = options
            .max_words
            .filter(|n| *n > 0)
            .unwrap_or(self.default_max_words);
        let prompt = build_prompt(
            &transcript.text,
            max_words,
            options.additional_prompt.as_deref(),
        );

        let request = ChatRequest {
            model: &self.config.summarization_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: TEMPERATURE,
        };

        tracing::debug!(
            source_id,
            model = %self.config.summarization_model,
            max_words,
            transcript_words = transcript.word_count(),
            "Requesting summary"
        );

        let url = format!("{}/chat/completions", self.config.api_base);
        let response = send_checked(
            self.http_client.post(url).bearer_auth(api_key).json(&request),
            StageErrorCode::SummarizationFailed,
        )
        .await?;

        let body: ChatResponse = response.json().await.map_err(|e| {
            StageError::new(
                StageErrorCode::SummarizationFailed,
                format!("Malformed completion response: {}", e),
            )
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                StageError::new(
                    StageErrorCode::SummarizationFailed,
                    "Completion contained no summary",
                )
            })?;

        let summary = Summary::new(content, source_type, source_id);
        tracing::info!(
            source_id,
            word_count = summary.metadata.word_count,
            "Summary generated"
        );
        Ok(summary)
    }
}
