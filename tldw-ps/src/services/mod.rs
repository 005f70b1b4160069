//! Business logic services for tldw-ps

pub mod admission_queue;
pub mod media;
pub mod openai;
pub mod pipeline_orchestrator;
pub mod progress_tracker;
pub mod stage;

pub use admission_queue::{AdmissionQueue, QueueEntry};
pub use media::{UploadedFileProcessor, YoutubeMediaProcessor};
pub use openai::{OpenAiSummarizationService, OpenAiTranscriptionService};
pub use pipeline_orchestrator::{PipelineOrchestrator, PipelineState};
pub use progress_tracker::ProgressTracker;
pub use stage::{
    DefaultPipelineFactory, MediaProcessor, PipelineFactory, StageSet, SummarizationService,
    TranscriptionService,
};
