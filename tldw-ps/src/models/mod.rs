//! Data models for tldw-ps

pub mod job;
pub mod media;
pub mod stages;

pub use job::{extract_video_id, Job, Source, SourceKind, SummaryOptions};
pub use media::{
    word_count, MediaMetadata, ProcessedMedia, Summary, SummaryMetadata, Transcript,
    TranscriptSegment,
};
pub use stages::{ProcessingStage, Stage, STAGES};
