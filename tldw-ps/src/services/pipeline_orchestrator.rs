//! Pipeline orchestrator
//!
//! Drives one job through its stages and owns its progress tracker.
//!
//! # State Progression
//! INITIALIZING → MEDIA_PROCESSING → TRANSCRIBING → (TRANSCRIPT_ONLY | SUMMARIZING) → COMPLETED
//!
//! Any stage failure moves the job to FAILED: the tracker emits one `error`
//! event carrying the failure's stable code and the original error is returned
//! to the caller. Whatever the outcome, the media processor's `cleanup` runs
//! exactly once before `process` returns.
//!
//! Every collaborator call goes through the job's [`RetryPolicy`].

use crate::error::PipelineError;
use crate::models::{Job, Source, Stage, Summary, SummaryOptions};
use crate::services::progress_tracker::ProgressTracker;
use crate::services::stage::StageSet;
use crate::utils::retry::RetryPolicy;
use std::sync::Arc;
use tldw_common::Progress;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    MediaProcessing,
    Transcribing,
    TranscriptOnly,
    Summarizing,
    Completed,
    Failed,
}

/// Orchestrates a single job
///
/// Attach observers with [`PipelineOrchestrator::on_progress`] or
/// [`PipelineOrchestrator::subscribe`] before calling
/// [`PipelineOrchestrator::process`], which consumes the orchestrator.
pub struct PipelineOrchestrator {
    job_id: Uuid,
    stages: StageSet,
    retry: RetryPolicy,
    tracker: Arc<ProgressTracker>,
}

impl PipelineOrchestrator {
    pub fn new(stages: StageSet, retry: RetryPolicy) -> Self {
        let job_id = Uuid::new_v4();
        Self {
            job_id,
            stages,
            retry,
            tracker: Arc::new(ProgressTracker::new(job_id)),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// The job's tracker, e.g. for registering cleanup tasks
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Register a synchronous progress observer
    pub fn on_progress<F>(&self, observer: F)
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.tracker.add_observer(observer);
    }

    /// Receive progress events through a lossless channel
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Progress> {
        self.tracker.subscribe()
    }

    /// Run the job to completion
    pub async fn process(
        self,
        source: Source,
        options: SummaryOptions,
    ) -> Result<Summary, PipelineError> {
        let start_time = std::time::Instant::now();
        let job = Job::new(self.job_id, source, options);

        tracing::info!(
            job_id = %job.job_id,
            source_type = %job.source.kind(),
            media_processor = self.stages.media.name(),
            transcript_only = job.options.transcript_only,
            "Starting pipeline"
        );

        let mut media_id: Option<String> = None;
        let mut state = PipelineState::Initializing;
        let result = self.run_stages(&job, &mut state, &mut media_id).await;

        match &result {
            Ok(summary) => {
                tracing::info!(
                    job_id = %job.job_id,
                    word_count = summary.metadata.word_count,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    "Pipeline completed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    failed_in = ?state,
                    code = err.code(),
                    elapsed_ms = start_time.elapsed().as_millis(),
                    "Pipeline failed"
                );
                self.transition(&mut state, PipelineState::Failed);
                self.tracker
                    .error_with_code(err.code(), &err.to_string())
                    .await;
            }
        }

        let cleanup_id = media_id.unwrap_or_else(|| job.source.fallback_media_id());
        self.cleanup_media(&cleanup_id).await;

        result
    }

    async fn run_stages(
        &self,
        job: &Job,
        state: &mut PipelineState,
        media_id: &mut Option<String>,
    ) -> Result<Summary, PipelineError> {
        let media_processor = &self.stages.media;
        let tracker = self.tracker.as_ref();

        self.tracker.update_progress(Stage::Initialization, 100.0);

        self.transition(state, PipelineState::MediaProcessing);
        self.retry
            .run("resources", || media_processor.ensure_resources())
            .await?;
        self.tracker.update_progress(Stage::Resources, 100.0);

        let media = self
            .retry
            .run("media", || media_processor.process_media(&job.source, tracker))
            .await?;
        if !media.id.trim().is_empty() {
            *media_id = Some(media.id.clone());
        }
        self.tracker.update_progress(Stage::Audio, 100.0);

        tracing::debug!(
            job_id = %job.job_id,
            media_id = %media.id,
            audio = %media.audio_path.display(),
            duration_secs = media.metadata.duration_secs,
            size_bytes = media.metadata.size_bytes,
            "Media ready"
        );

        self.transition(state, PipelineState::Transcribing);
        self.tracker.update_progress(Stage::Transcription, 0.0);
        let transcription = &self.stages.transcription;
        let transcript = self
            .retry
            .run("transcription", || transcription.transcribe(&media, tracker))
            .await?;
        self.tracker.update_progress(Stage::Transcription, 100.0);

        tracing::debug!(
            job_id = %job.job_id,
            words = transcript.word_count(),
            segments = transcript.segments.len(),
            "Transcript ready"
        );

        let source_type = job.source.kind();

        if job.options.transcript_only {
            self.transition(state, PipelineState::TranscriptOnly);
            let summary = Summary::new(transcript.text, source_type, media.id.clone());
            self.finish(state, &summary).await;
            return Ok(summary);
        }

        self.transition(state, PipelineState::Summarizing);
        self.tracker.update_progress(Stage::Summarization, 0.0);
        let summarization = &self.stages.summarization;
        let summary = self
            .retry
            .run("summarization", || {
                summarization.summarize(&transcript, &job.options, source_type, &media.id)
            })
            .await?;
        self.tracker.update_progress(Stage::Summarization, 100.0);

        self.finish(state, &summary).await;
        Ok(summary)
    }

    async fn finish(&self, state: &mut PipelineState, summary: &Summary) {
        self.tracker.update_progress(Stage::Finalization, 0.0);
        self.transition(state, PipelineState::Completed);
        self.tracker.complete(&summary.content).await;
    }

    fn transition(&self, state: &mut PipelineState, next: PipelineState) {
        tracing::debug!(job_id = %self.job_id, from = ?*state, to = ?next, "Pipeline state transition");
        *state = next;
    }

    /// Best-effort media cleanup; failures are logged only
    async fn cleanup_media(&self, media_id: &str) {
        match self.stages.media.cleanup(media_id).await {
            Ok(()) => {
                tracing::debug!(job_id = %self.job_id, media_id, "Media cleanup finished");
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    media_id,
                    error = %e,
                    "Media cleanup failed"
                );
            }
        }
    }
}
