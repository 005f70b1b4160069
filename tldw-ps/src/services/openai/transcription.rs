//! Transcription via `POST {api_base}/audio/transcriptions`

use super::{build_http_client, require_api_key, send_checked};
use crate::config::OpenAiConfig;
use crate::error::{StageError, StageErrorCode};
use crate::models::{ProcessedMedia, Stage, Transcript, TranscriptSegment};
use crate::services::progress_tracker::ProgressTracker;
use crate::services::stage::TranscriptionService;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// `verbose_json` transcription response
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
}

impl From<VerboseTranscription> for Transcript {
    fn from(response: VerboseTranscription) -> Self {
        Transcript {
            text: response.text.trim().to_string(),
            segments: response
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start_secs: s.start,
                    end_secs: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
        }
    }
}

/// Whisper-style transcription client
pub struct OpenAiTranscriptionService {
    http_client: reqwest::Client,
    config: OpenAiConfig,
    max_upload_bytes: u64,
}

impl OpenAiTranscriptionService {
    pub fn new(config: OpenAiConfig, max_upload_bytes: u64) -> Result<Self, StageError> {
        Ok(Self {
            http_client: build_http_client(REQUEST_TIMEOUT)?,
            config,
            max_upload_bytes,
        })
    }
}

#[async_trait]
impl TranscriptionService for OpenAiTranscriptionService {
    async fn transcribe(
        &self,
        media: &ProcessedMedia,
        progress: &ProgressTracker,
    ) -> Result<Transcript, StageError> {
        let api_key = require_api_key(&self.config)?;

        if media.metadata.size_bytes > self.max_upload_bytes {
            return Err(StageError::new(
                StageErrorCode::MediaTooLarge,
                format!(
                    "Audio is {} bytes; the transcription limit is {} bytes",
                    media.metadata.size_bytes, self.max_upload_bytes
                ),
            ));
        }

        let audio = tokio::fs::read(&media.audio_path).await.map_err(|e| {
            StageError::new(
                StageErrorCode::Internal,
                format!("Cannot read {}: {}", media.audio_path.display(), e),
            )
        })?;

        let file_name = media
            .audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.{}", media.id, media.metadata.format));

        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "verbose_json")
            .part("file", Part::bytes(audio).file_name(file_name));

        tracing::debug!(
            media_id = %media.id,
            model = %self.config.transcription_model,
            size_bytes = media.metadata.size_bytes,
            "Uploading audio for transcription"
        );
        progress.update_progress(Stage::Transcription, 10.0);

        let url = format!("{}/audio/transcriptions", self.config.api_base);
        let response = send_checked(
            self.http_client
                .post(url)
                .bearer_auth(api_key)
                .multipart(form),
            StageErrorCode::TranscriptionFailed,
        )
        .await?;

        progress.update_progress(Stage::Transcription, 90.0);

        let body: VerboseTranscription = response.json().await.map_err(|e| {
            StageError::new(
                StageErrorCode::TranscriptionFailed,
                format!("Malformed transcription response: {}", e),
            )
        })?;

        let transcript = Transcript::from(body);
        if transcript.text.is_empty() {
            return Err(StageError::new(
                StageErrorCode::TranscriptionFailed,
                "No speech detected in audio",
            ));
        }

        tracing::info!(
            media_id = %media.id,
            words = transcript.word_count(),
            segments = transcript.segments.len(),
            "Transcription complete"
        );

        Ok(transcript)
    }
}
