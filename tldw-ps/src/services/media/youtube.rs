//! YouTube media processor
//!
//! Downloads a video's audio track with `yt-dlp` into the work directory as
//! `<video_id>.<audio_format>`. Download percentages reported by `yt-dlp`
//! drive the `media` stage; audio extraction drives the `audio` stage.

use super::{ensure_dir, remove_media_files};
use crate::error::{StageError, StageErrorCode};
use crate::models::{extract_video_id, MediaMetadata, ProcessedMedia, Source, Stage};
use crate::services::progress_tracker::ProgressTracker;
use crate::services::stage::MediaProcessor;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::OnceCell;

/// Marker prefixing the duration line requested with `--print`
const DURATION_MARKER: &str = "TLDW_DURATION ";

/// yt-dlp backed processor for [`Source::Youtube`]
pub struct YoutubeMediaProcessor {
    ytdlp_path: String,
    work_dir: PathBuf,
    audio_format: String,
    max_bytes: u64,
    resources: OnceCell<()>,
}

impl YoutubeMediaProcessor {
    pub fn new(ytdlp_path: String, work_dir: PathBuf, audio_format: String, max_bytes: u64) -> Self {
        Self {
            ytdlp_path,
            work_dir,
            audio_format,
            max_bytes,
            resources: OnceCell::new(),
        }
    }

    async fn check_ytdlp(&self) -> Result<(), StageError> {
        ensure_dir(&self.work_dir).await?;

        let output = Command::new(&self.ytdlp_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                let message = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("{} not found in PATH", self.ytdlp_path)
                } else {
                    format!("Failed to execute {}: {}", self.ytdlp_path, e)
                };
                StageError::new(StageErrorCode::ResourceUnavailable, message)
            })?;

        if !output.status.success() {
            return Err(StageError::new(
                StageErrorCode::ResourceUnavailable,
                format!("{} --version exited with {}", self.ytdlp_path, output.status),
            ));
        }

        tracing::info!(
            ytdlp = %self.ytdlp_path,
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            work_dir = %self.work_dir.display(),
            "yt-dlp available"
        );
        Ok(())
    }

    fn audio_path(&self, video_id: &str) -> PathBuf {
        self.work_dir
            .join(format!("{}.{}", video_id, self.audio_format))
    }
}

#[async_trait]
impl MediaProcessor for YoutubeMediaProcessor {
    fn name(&self) -> &'static str {
        "youtube"
    }

    async fn ensure_resources(&self) -> Result<(), StageError> {
        self.resources
            .get_or_try_init(|| self.check_ytdlp())
            .await
            .map(|_| ())
    }

    async fn process_media(
        &self,
        source: &Source,
        progress: &ProgressTracker,
    ) -> Result<ProcessedMedia, StageError> {
        let url = match source {
            Source::Youtube { url } => url,
            other => {
                return Err(StageError::new(
                    StageErrorCode::InvalidSource,
                    format!("YouTube processor cannot handle {} sources", other.kind()),
                ))
            }
        };

        let video_id = extract_video_id(url).ok_or_else(|| {
            StageError::new(StageErrorCode::InvalidSource, "Invalid YouTube URL")
                .with_detail("url", url.as_str())
        })?;

        let output_template = self.work_dir.join(format!("{}.%(ext)s", video_id));
        let audio_path = self.audio_path(&video_id);

        tracing::debug!(
            video_id = %video_id,
            output = %audio_path.display(),
            "Running yt-dlp"
        );
        progress.update_progress(Stage::Media, 0.0);

        let mut child = Command::new(&self.ytdlp_path)
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--progress")
            .arg("--no-simulate")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.audio_format)
            .arg("--max-filesize")
            .arg(self.max_bytes.to_string())
            .arg("--print")
            .arg(format!("after_move:{}%(duration)s", DURATION_MARKER))
            .arg("--output")
            .arg(&output_template)
            .arg("--")
            .arg(format!("https://www.youtube.com/watch?v={}", video_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StageError::new(
                    StageErrorCode::ResourceUnavailable,
                    format!("Failed to execute {}: {}", self.ytdlp_path, e),
                )
            })?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut duration_secs = 0.0;
        let mut too_large = false;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(percent) = parse_download_percent(&line) {
                    progress.update_progress(Stage::Media, percent);
                } else if line.starts_with("[ExtractAudio]") {
                    progress.update_progress(Stage::Audio, 0.0);
                } else if let Some(value) = line.strip_prefix(DURATION_MARKER) {
                    duration_secs = value.trim().parse().unwrap_or(0.0);
                } else if line.contains("larger than max-filesize") {
                    too_large = true;
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            StageError::new(
                StageErrorCode::DownloadFailed,
                format!("yt-dlp did not finish: {}", e),
            )
        })?;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            tracing::warn!(
                video_id = %video_id,
                status = %status,
                stderr = %stderr.trim(),
                "yt-dlp failed"
            );
            let mut error = classify_ytdlp_failure(&stderr);
            if let Some(code) = status.code() {
                error = error.with_detail("exit_code", code);
            }
            return Err(error.with_detail("video_id", video_id.as_str()));
        }

        if too_large {
            return Err(StageError::new(
                StageErrorCode::MediaTooLarge,
                format!("Media exceeds the {} byte limit", self.max_bytes),
            )
            .with_detail("video_id", video_id.as_str()));
        }

        let size_bytes = match tokio::fs::metadata(&audio_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return Err(StageError::new(
                    StageErrorCode::DownloadFailed,
                    format!("yt-dlp produced no audio file: {}", e),
                )
                .with_detail("path", audio_path.display().to_string()))
            }
        };

        progress.update_progress(Stage::Audio, 100.0);

        tracing::info!(
            video_id = %video_id,
            size_bytes,
            duration_secs,
            "YouTube audio extracted"
        );

        Ok(ProcessedMedia {
            id: video_id,
            audio_path,
            metadata: MediaMetadata {
                duration_secs,
                format: self.audio_format.clone(),
                size_bytes,
            },
        })
    }

    async fn cleanup(&self, media_id: &str) -> Result<(), StageError> {
        let removed = remove_media_files(&self.work_dir, media_id).await?;
        tracing::debug!(media_id, removed, "YouTube media cleaned up");
        Ok(())
    }
}

/// Parse a `[download]  42.3% of ...` progress line
fn parse_download_percent(line: &str) -> Option<f64> {
    let rest = line.strip_prefix("[download]")?;
    let token = rest.split_whitespace().next()?;
    token.strip_suffix('%')?.parse().ok()
}

/// Map yt-dlp's error output onto a stable code
fn classify_ytdlp_failure(stderr: &str) -> StageError {
    let lower = stderr.to_lowercase();

    let code = if [
        "private video",
        "video unavailable",
        "is not available",
        "members-only",
        "sign in to confirm your age",
        "has been removed",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
    {
        StageErrorCode::MediaUnavailable
    } else if lower.contains("http error 429") || lower.contains("too many requests") {
        StageErrorCode::RateLimited
    } else if lower.contains("unable to download")
        || lower.contains("timed out")
        || lower.contains("connection")
    {
        StageErrorCode::Network
    } else {
        StageErrorCode::DownloadFailed
    };

    let message = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .unwrap_or("yt-dlp exited unsuccessfully")
        .to_string();

    StageError::new(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_parse_download_percent() {
        assert_eq!(
            parse_download_percent("[download]  42.3% of   3.21MiB at  1.00MiB/s ETA 00:02"),
            Some(42.3)
        );
        assert_eq!(parse_download_percent("[download] 100% of 3.21MiB"), Some(100.0));
        assert_eq!(
            parse_download_percent("[download] Destination: /tmp/abc.webm"),
            None
        );
        assert_eq!(parse_download_percent("[youtube] abc: Downloading webpage"), None);
    }

    #[test]
    fn test_classify_failures() {
        let private = classify_ytdlp_failure("ERROR: [youtube] abc: Private video. Sign in");
        assert_eq!(private.code, StageErrorCode::MediaUnavailable);
        assert_eq!(private.message, "ERROR: [youtube] abc: Private video. Sign in");

        let throttled = classify_ytdlp_failure("ERROR: unable to download video data: HTTP Error 429");
        assert_eq!(throttled.code, StageErrorCode::RateLimited);

        let unknown = classify_ytdlp_failure("something odd");
        assert_eq!(unknown.code, StageErrorCode::DownloadFailed);
        assert_eq!(unknown.message, "yt-dlp exited unsuccessfully");
    }

    #[tokio::test]
    async fn test_rejects_non_youtube_url() {
        let dir = tempfile::tempdir().unwrap();
        let processor = YoutubeMediaProcessor::new(
            "yt-dlp".to_string(),
            dir.path().to_path_buf(),
            "mp3".to_string(),
            1024,
        );
        let tracker = ProgressTracker::new(Uuid::new_v4());

        let err = processor
            .process_media(
                &Source::Youtube {
                    url: "https://vimeo.com/123".to_string(),
                },
                &tracker,
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, StageErrorCode::InvalidSource);
    }

    #[tokio::test]
    async fn test_missing_binary_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let processor = YoutubeMediaProcessor::new(
            "definitely-not-yt-dlp-binary".to_string(),
            dir.path().join("work"),
            "mp3".to_string(),
            1024,
        );

        let err = processor.ensure_resources().await.unwrap_err();
        assert_eq!(err.code, StageErrorCode::ResourceUnavailable);
        assert!(dir.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_cleanup_removes_video_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.mp3"), b"audio").unwrap();
        std::fs::write(dir.path().join("abc.webm.part"), b"partial").unwrap();
        let processor = YoutubeMediaProcessor::new(
            "yt-dlp".to_string(),
            dir.path().to_path_buf(),
            "mp3".to_string(),
            1024,
        );

        processor.cleanup("abc").await.unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
