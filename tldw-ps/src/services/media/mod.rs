//! Media processors
//!
//! Both processors leave their audio in the work directory as
//! `<media_id>.<ext>`, so cleanup is the same for both: remove `<media_id>.*`.

pub mod upload;
pub mod youtube;

pub use upload::UploadedFileProcessor;
pub use youtube::YoutubeMediaProcessor;

use crate::error::{StageError, StageErrorCode};
use std::path::Path;

/// Whether `id` is safe to use as a file stem inside the work directory
pub(crate) fn is_safe_media_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Create `dir` if missing
pub(crate) async fn ensure_dir(dir: &Path) -> Result<(), StageError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        StageError::new(
            StageErrorCode::ResourceUnavailable,
            format!("Cannot create {}: {}", dir.display(), e),
        )
        .with_detail("path", dir.display().to_string())
    })
}

/// Remove every `<media_id>.*` file in `dir`; returns how many were removed
///
/// A missing directory or unknown id removes nothing. Ids that could escape
/// `dir` are refused.
pub(crate) async fn remove_media_files(dir: &Path, media_id: &str) -> Result<usize, StageError> {
    if !is_safe_media_id(media_id) {
        return Err(StageError::new(
            StageErrorCode::InvalidSource,
            format!("Refusing cleanup of unsafe media id '{}'", media_id),
        ));
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(StageError::new(
                StageErrorCode::Internal,
                format!("Cannot list {}: {}", dir.display(), e),
            ))
        }
    };

    let prefix = format!("{}.", media_id);
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                return Err(StageError::new(
                    StageErrorCode::Internal,
                    format!("Cannot list {}: {}", dir.display(), e),
                ))
            }
        };

        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(&prefix) {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StageError::new(
                    StageErrorCode::Internal,
                    format!("Cannot remove {}: {}", entry.path().display(), e),
                ))
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_media_ids() {
        assert!(is_safe_media_id("dQw4w9WgXcQ"));
        assert!(is_safe_media_id("0b7e2c9a-5c1d-4f7e-9a3b-2d4c6e8f0a1b"));
        assert!(!is_safe_media_id(""));
        assert!(!is_safe_media_id("../etc"));
        assert!(!is_safe_media_id("a/b"));
        assert!(!is_safe_media_id("a.b"));
    }

    #[tokio::test]
    async fn test_remove_media_files_matches_stem_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["abc.mp3", "abc.webm", "abcd.mp3", "other.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed = remove_media_files(dir.path(), "abc").await.unwrap();

        assert_eq!(removed, 2);
        assert!(!dir.path().join("abc.mp3").exists());
        assert!(dir.path().join("abcd.mp3").exists());
        assert!(dir.path().join("other.mp3").exists());
    }

    #[tokio::test]
    async fn test_remove_media_files_tolerates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(remove_media_files(&missing, "abc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_media_files_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = remove_media_files(dir.path(), "../abc").await.unwrap_err();
        assert_eq!(err.code, StageErrorCode::InvalidSource);
    }
}
