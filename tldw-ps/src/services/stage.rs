//! Stage collaborator contracts
//!
//! One trait per pipeline stage. Implementations are chosen per job by a
//! [`PipelineFactory`] keyed on the source kind, so the orchestrator only ever
//! sees a [`StageSet`].

use crate::config::ServiceConfig;
use crate::error::StageError;
use crate::models::{ProcessedMedia, Source, SourceKind, Summary, SummaryOptions, Transcript};
use crate::services::media::{UploadedFileProcessor, YoutubeMediaProcessor};
use crate::services::openai::{OpenAiSummarizationService, OpenAiTranscriptionService};
use crate::services::progress_tracker::ProgressTracker;
use async_trait::async_trait;
use std::sync::Arc;

/// Acquires media and turns it into local audio
///
/// Failures must be classified [`StageError`]s so the job's error event
/// carries a stable code.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Processor name for logging
    fn name(&self) -> &'static str;

    /// Prepare directories / verify external tools
    ///
    /// Called before every job; implementations do the work once and return
    /// the cached outcome afterwards.
    async fn ensure_resources(&self) -> Result<(), StageError> {
        Ok(())
    }

    /// Fetch and extract audio for `source`
    ///
    /// May report `media` / `audio` stage progress through `progress`.
    async fn process_media(
        &self,
        source: &Source,
        progress: &ProgressTracker,
    ) -> Result<ProcessedMedia, StageError>;

    /// Release everything stored under `media_id`
    ///
    /// Must tolerate ids for which nothing was ever created.
    async fn cleanup(&self, media_id: &str) -> Result<(), StageError>;
}

/// Speech-to-text backend
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe `media`; may report `transcription` stage progress
    async fn transcribe(
        &self,
        media: &ProcessedMedia,
        progress: &ProgressTracker,
    ) -> Result<Transcript, StageError>;
}

/// Summary generation backend
#[async_trait]
pub trait SummarizationService: Send + Sync {
    async fn summarize(
        &self,
        transcript: &Transcript,
        options: &SummaryOptions,
        source_type: SourceKind,
        source_id: &str,
    ) -> Result<Summary, StageError>;
}

/// Collaborators for one job
#[derive(Clone)]
pub struct StageSet {
    pub media: Arc<dyn MediaProcessor>,
    pub transcription: Arc<dyn TranscriptionService>,
    pub summarization: Arc<dyn SummarizationService>,
}

/// Chooses stage collaborators by source kind
pub trait PipelineFactory: Send + Sync {
    fn stages_for(&self, kind: SourceKind) -> StageSet;
}

/// Factory with one media processor per source kind and shared
/// transcription / summarization backends
pub struct DefaultPipelineFactory {
    youtube: Arc<dyn MediaProcessor>,
    file: Arc<dyn MediaProcessor>,
    transcription: Arc<dyn TranscriptionService>,
    summarization: Arc<dyn SummarizationService>,
}

impl DefaultPipelineFactory {
    pub fn new(
        youtube: Arc<dyn MediaProcessor>,
        file: Arc<dyn MediaProcessor>,
        transcription: Arc<dyn TranscriptionService>,
        summarization: Arc<dyn SummarizationService>,
    ) -> Self {
        Self {
            youtube,
            file,
            transcription,
            summarization,
        }
    }

    /// Production collaborators: yt-dlp, staged uploads and OpenAI-compatible APIs
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StageError> {
        let youtube = YoutubeMediaProcessor::new(
            config.ytdlp_path.clone(),
            config.work_dir.clone(),
            config.audio_format.clone(),
            config.max_upload_bytes,
        );
        let file = UploadedFileProcessor::new(config.work_dir.clone(), config.max_upload_bytes);
        let transcription =
            OpenAiTranscriptionService::new(config.openai.clone(), config.max_upload_bytes)?;
        let summarization =
            OpenAiSummarizationService::new(config.openai.clone(), config.default_max_words)?;

        Ok(Self::new(
            Arc::new(youtube),
            Arc::new(file),
            Arc::new(transcription),
            Arc::new(summarization),
        ))
    }
}

impl PipelineFactory for DefaultPipelineFactory {
    fn stages_for(&self, kind: SourceKind) -> StageSet {
        let media = match kind {
            SourceKind::Youtube => Arc::clone(&self.youtube),
            SourceKind::File => Arc::clone(&self.file),
        };

        StageSet {
            media,
            transcription: Arc::clone(&self.transcription),
            summarization: Arc::clone(&self.summarization),
        }
    }
}
