//! Stage artifacts: processed media, transcript, summary

use super::job::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audio prepared by a media processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMedia {
    /// Key for [`crate::services::MediaProcessor::cleanup`]
    pub id: String,
    /// Extracted audio on local disk
    pub audio_path: PathBuf,
    pub metadata: MediaMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Seconds; 0 when the processor cannot determine it
    pub duration_secs: f64,
    /// Container / codec extension, e.g. `mp3`
    pub format: String,
    pub size_bytes: u64,
}

/// Timed transcript segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub word_count: usize,
    pub source_type: SourceKind,
    pub source_id: String,
    pub generated_at: DateTime<Utc>,
}

/// Final artifact of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub content: String,
    pub metadata: SummaryMetadata,
}

impl Summary {
    /// Build a summary, deriving the word count from `content`
    pub fn new(content: impl Into<String>, source_type: SourceKind, source_id: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            metadata: SummaryMetadata {
                word_count: word_count(&content),
                source_type,
                source_id: source_id.into(),
                generated_at: Utc::now(),
            },
            content,
        }
    }
}

/// Naive whitespace tokenization
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
