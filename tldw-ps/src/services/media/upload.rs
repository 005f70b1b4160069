//! Uploaded file processor
//!
//! Uploads are staged by the HTTP layer; this processor validates them and
//! moves them into the work directory as `<upload_id>.<ext>`. The transcription
//! backend accepts these containers directly, so no extraction step runs.

use super::{ensure_dir, is_safe_media_id, remove_media_files};
use crate::error::{StageError, StageErrorCode};
use crate::models::{MediaMetadata, ProcessedMedia, Source, Stage};
use crate::services::progress_tracker::ProgressTracker;
use crate::services::stage::MediaProcessor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Accepted upload extensions (lowercase)
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp3", "mp4", "m4a", "mpeg", "mpga", "wav", "webm", "ogg", "oga", "flac",
];

/// Lowercased extension of `filename` if it is an accepted format
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Processor for [`Source::File`]
pub struct UploadedFileProcessor {
    work_dir: PathBuf,
    max_bytes: u64,
}

impl UploadedFileProcessor {
    pub fn new(work_dir: PathBuf, max_bytes: u64) -> Self {
        Self {
            work_dir,
            max_bytes,
        }
    }
}

#[async_trait]
impl MediaProcessor for UploadedFileProcessor {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn ensure_resources(&self) -> Result<(), StageError> {
        ensure_dir(&self.work_dir).await
    }

    async fn process_media(
        &self,
        source: &Source,
        progress: &ProgressTracker,
    ) -> Result<ProcessedMedia, StageError> {
        let (upload_id, path, filename) = match source {
            Source::File {
                upload_id,
                path,
                filename,
            } => (upload_id, path, filename),
            other => {
                return Err(StageError::new(
                    StageErrorCode::InvalidSource,
                    format!("File processor cannot handle {} sources", other.kind()),
                ))
            }
        };

        if !is_safe_media_id(upload_id) {
            return Err(StageError::new(
                StageErrorCode::InvalidSource,
                "Invalid upload id",
            ));
        }

        let ext = allowed_extension(filename).ok_or_else(|| {
            StageError::new(
                StageErrorCode::UnsupportedFormat,
                format!(
                    "Unsupported file type. Accepted: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ),
            )
            .with_detail("filename", filename.as_str())
        })?;

        progress.update_progress(Stage::Media, 0.0);

        let size_bytes = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) | Err(_) => {
                return Err(StageError::new(
                    StageErrorCode::InvalidSource,
                    "Uploaded file is missing",
                )
                .with_detail("upload_id", upload_id.as_str()))
            }
        };

        if size_bytes > self.max_bytes {
            return Err(StageError::new(
                StageErrorCode::MediaTooLarge,
                format!(
                    "File is {} bytes; the limit is {} bytes",
                    size_bytes, self.max_bytes
                ),
            ));
        }

        let audio_path = self.work_dir.join(format!("{}.{}", upload_id, ext));
        if *path != audio_path {
            move_file(path, &audio_path).await.map_err(|e| {
                StageError::new(
                    StageErrorCode::Internal,
                    format!("Cannot stage upload into work dir: {}", e),
                )
                .with_detail("path", audio_path.display().to_string())
            })?;
        }

        progress.update_progress(Stage::Media, 100.0);
        progress.update_progress(Stage::Audio, 100.0);

        tracing::info!(
            upload_id = %upload_id,
            filename = %filename,
            size_bytes,
            "Uploaded media ready"
        );

        Ok(ProcessedMedia {
            id: upload_id.clone(),
            audio_path,
            metadata: MediaMetadata {
                duration_secs: 0.0,
                format: ext,
                size_bytes,
            },
        })
    }

    async fn cleanup(&self, media_id: &str) -> Result<(), StageError> {
        let removed = remove_media_files(&self.work_dir, media_id).await?;
        tracing::debug!(media_id, removed, "Uploaded media cleaned up");
        Ok(())
    }
}

/// Rename, falling back to copy + remove across filesystems
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}
