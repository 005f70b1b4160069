//! Job, source and option types

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Kind of media source a job starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Youtube,
    File,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Youtube => "youtube",
            SourceKind::File => "file",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media source descriptor
///
/// Serialized as `{"type": "youtube", "data": {"url": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Source {
    Youtube {
        url: String,
    },
    /// A file already staged on local disk by the upload handler
    File {
        upload_id: String,
        path: PathBuf,
        filename: String,
    },
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Youtube { .. } => SourceKind::Youtube,
            Source::File { .. } => SourceKind::File,
        }
    }

    /// Identifier used for media cleanup when media processing never produced one
    ///
    /// The video id or upload id when it can be derived from the payload,
    /// otherwise the source kind label. Never empty.
    pub fn fallback_media_id(&self) -> String {
        let hint = match self {
            Source::Youtube { url } => extract_video_id(url),
            Source::File { upload_id, .. } => {
                Some(upload_id.clone()).filter(|id| !id.trim().is_empty())
            }
        };
        hint.unwrap_or_else(|| self.kind().as_str().to_string())
    }
}

/// Extract the video id from a YouTube URL
///
/// Accepts `youtube.com/watch?v=ID`, `youtu.be/ID`, `youtube.com/shorts/ID`,
/// `youtube.com/embed/ID` and `youtube.com/live/ID`, with or without `www.`/`m.`.
pub fn extract_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host);

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("shorts") | Some("embed") | Some("live") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        }
        _ => None,
    }?;

    let valid = !candidate.is_empty()
        && candidate.len() <= 64
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    valid.then_some(candidate)
}

/// Per-job options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOptions {
    /// Upper bound on summary length; service default when absent
    #[serde(default, alias = "maxWords")]
    pub max_words: Option<usize>,
    /// Extra instructions appended to the summarization prompt
    #[serde(default, alias = "additionalPrompt")]
    pub additional_prompt: Option<String>,
    /// Skip summarization and return the raw transcript
    #[serde(default, alias = "returnTranscriptOnly")]
    pub transcript_only: bool,
}

/// One pipeline run
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: Uuid,
    pub source: Source,
    pub options: SummaryOptions,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: Uuid, source: Source, options: SummaryOptions) -> Self {
        Self {
            job_id,
            source,
            options,
            created_at: Utc::now(),
        }
    }
}
