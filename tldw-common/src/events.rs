//! Progress event types shared between the pipeline service and its clients
//!
//! A job reports its state as a sequence of [`Progress`] values. The sequence is
//! non-decreasing in `progress` and ends with exactly one terminal event
//! (`done` or `error`). Each value serializes to the JSON carried in one SSE
//! `data:` frame.

use serde::{Deserialize, Serialize};

/// Message shown to clients for every failed job.
///
/// The underlying failure text never leaves the service; clients branch on the
/// stable code carried in [`Progress::error`] instead.
pub const GENERIC_ERROR_MESSAGE: &str =
    "An error occurred while processing your request. Please try again later.";

/// Status label attached to each progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Request validation
    Initializing,
    /// Working directories, external tool checks
    Preparing,
    /// Fetching the media source
    Downloading,
    /// Audio extraction / conversion
    Processing,
    /// Speech-to-text
    Transcribing,
    /// Summary generation
    Summarizing,
    /// Assembling the final result
    Finalizing,
    /// Terminal: job succeeded
    Done,
    /// Terminal: job failed
    Error,
}

impl ProgressStatus {
    /// Whether this status ends the event stream
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStatus::Done | ProgressStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Initializing => "initializing",
            ProgressStatus::Preparing => "preparing",
            ProgressStatus::Downloading => "downloading",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Transcribing => "transcribing",
            ProgressStatus::Summarizing => "summarizing",
            ProgressStatus::Finalizing => "finalizing",
            ProgressStatus::Done => "done",
            ProgressStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub status: ProgressStatus,
    pub message: String,
    /// Overall job progress, 0-100 inclusive
    pub progress: u8,
    /// Stable error code, only present on `error` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Progress {
    /// Non-terminal progress update
    pub fn update(status: ProgressStatus, message: impl Into<String>, progress: u8) -> Self {
        Self {
            status,
            message: message.into(),
            progress: progress.min(100),
            error: None,
        }
    }

    /// Terminal success event carrying the final content as its message
    pub fn done(content: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Done,
            message: content.into(),
            progress: 100,
            error: None,
        }
    }

    /// Terminal failure event, frozen at the last reported progress
    pub fn failed(code: impl Into<String>, progress: u8) -> Self {
        Self {
            status: ProgressStatus::Error,
            message: GENERIC_ERROR_MESSAGE.to_string(),
            progress: progress.min(100),
            error: Some(code.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
