//! Summarization endpoints
//!
//! Every handler builds one [`PipelineOrchestrator`] and runs it on a spawned
//! task, so a timed-out or disconnected client never aborts the job or its
//! cleanup. The response is either the final summary as JSON or an SSE stream
//! of progress frames ending with the terminal frame.

use super::wants_event_stream;
use crate::error::{ApiError, ApiResult, StageError, StageErrorCode};
use crate::models::{extract_video_id, Source, Summary, SummaryOptions};
use crate::services::media::upload::{allowed_extension, ALLOWED_EXTENSIONS};
use crate::services::PipelineOrchestrator;
use crate::AppState;
use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tldw_common::sse::progress_sse_stream;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Multipart framing allowance on top of the upload limit
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// POST /api/summarize request
#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub source: Source,
    #[serde(default)]
    pub options: SummaryOptions,
}

/// GET /api/summarize/stream query
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub url: String,
    #[serde(default, alias = "maxWords")]
    pub max_words: Option<usize>,
    #[serde(default, alias = "additionalPrompt")]
    pub additional_prompt: Option<String>,
    #[serde(default, alias = "returnTranscriptOnly")]
    pub transcript_only: Option<bool>,
}

/// JSON result of a completed job
#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub job_id: Uuid,
    pub summary: Summary,
}

/// POST /api/summarize
///
/// Accepts YouTube sources only; files go through `/api/upload`.
pub async fn summarize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SummarizeRequest>,
) -> ApiResult<Response> {
    let url = match &request.source {
        Source::Youtube { url } => url,
        Source::File { .. } => {
            return Err(ApiError::BadRequest(
                "File sources must be uploaded through /api/upload".to_string(),
            ))
        }
    };
    validate_youtube_url(url)?;

    run_job(
        &state,
        request.source,
        request.options,
        wants_event_stream(&headers),
        None,
    )
    .await
}

/// GET /api/summarize/stream
///
/// EventSource clients cannot send a body, so options travel in the query.
pub async fn summarize_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    validate_youtube_url(&query.url)?;

    let options = SummaryOptions {
        max_words: query.max_words,
        additional_prompt: query.additional_prompt,
        transcript_only: query.transcript_only.unwrap_or(false),
    };

    run_job(
        &state,
        Source::Youtube { url: query.url },
        options,
        true,
        None,
    )
    .await
}

/// POST /api/upload
///
/// Multipart form with a `file` part plus optional `max_words`,
/// `additional_prompt` and `transcript_only` fields.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let upload_id = Uuid::new_v4().to_string();
    let mut staged: Option<(PathBuf, String)> = None;
    let mut options = SummaryOptions::default();

    let result: ApiResult<()> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    if staged.is_some() {
                        return Err(ApiError::BadRequest(
                            "Only one file per request".to_string(),
                        ));
                    }
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let ext = allowed_extension(&filename).ok_or_else(|| {
                        unsupported_format(&filename)
                    })?;
                    let path = state.config.uploads_dir.join(format!("{}.{}", upload_id, ext));
                    // Recorded before writing so a partial file is still removed
                    staged = Some((path.clone(), filename));
                    stage_upload(field, &path, state.config.max_upload_bytes).await?;
                }
                "max_words" | "maxWords" => {
                    let text = field_text(field).await?;
                    if !text.trim().is_empty() {
                        options.max_words = Some(text.trim().parse().map_err(|_| {
                            ApiError::BadRequest(format!("Invalid max_words: {}", text))
                        })?);
                    }
                }
                "additional_prompt" | "additionalPrompt" => {
                    let text = field_text(field).await?;
                    options.additional_prompt = Some(text).filter(|t| !t.trim().is_empty());
                }
                "transcript_only" | "returnTranscriptOnly" => {
                    let text = field_text(field).await?;
                    options.transcript_only = parse_flag(&text);
                }
                other => {
                    tracing::debug!(field = other, "Ignoring unknown multipart field");
                }
            }
        }
        Ok(())
    }
    .await;

    let (path, filename) = match (result, staged) {
        (Ok(()), Some(staged)) => staged,
        (Ok(()), None) => {
            return Err(ApiError::BadRequest("Missing 'file' field".to_string()));
        }
        (Err(e), staged) => {
            if let Some((path, _)) = staged {
                remove_staged_upload(&path).await;
            }
            return Err(e);
        }
    };

    tracing::info!(
        upload_id = %upload_id,
        filename = %filename,
        path = %path.display(),
        "Upload staged"
    );

    let source = Source::File {
        upload_id,
        path: path.clone(),
        filename,
    };

    run_job(&state, source, options, wants_event_stream(&headers), Some(path)).await
}

/// Start a job and shape its response
async fn run_job(
    state: &AppState,
    source: Source,
    mut options: SummaryOptions,
    streaming: bool,
    staged_upload: Option<PathBuf>,
) -> ApiResult<Response> {
    if options.max_words.map_or(true, |n| n == 0) {
        options.max_words = Some(state.config.default_max_words);
    }

    let stages = state.factory.stages_for(source.kind());
    let orchestrator = PipelineOrchestrator::new(stages, state.config.retry);
    let job_id = orchestrator.job_id();

    if let Some(path) = staged_upload {
        orchestrator
            .tracker()
            .add_cleanup_task(move || async move {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(anyhow::anyhow!(
                        "Failed to remove staged upload {}: {}",
                        path.display(),
                        e
                    )),
                }
            });
    }

    tracing::info!(
        job_id = %job_id,
        source_type = %source.kind(),
        streaming,
        "Job accepted"
    );

    if streaming {
        let rx = orchestrator.subscribe();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.process(source, options).await {
                tracing::debug!(job_id = %job_id, code = e.code(), "Streamed job failed");
            }
        });
        return Ok(progress_sse_stream(job_id.to_string(), rx).into_response());
    }

    let handle = tokio::spawn(orchestrator.process(source, options));
    match handle.await {
        Ok(Ok(summary)) => Ok(Json(SummarizeResponse { job_id, summary }).into_response()),
        Ok(Err(e)) => Err(ApiError::Pipeline(e)),
        Err(e) => Err(ApiError::Internal(format!("Job {} panicked: {}", job_id, e))),
    }
}

fn validate_youtube_url(url: &str) -> ApiResult<()> {
    if extract_video_id(url).is_none() {
        return Err(ApiError::BadRequest(format!("Invalid YouTube URL: {}", url)));
    }
    Ok(())
}

fn unsupported_format(filename: &str) -> ApiError {
    ApiError::Pipeline(
        StageError::new(
            StageErrorCode::UnsupportedFormat,
            format!(
                "Unsupported file type '{}'. Accepted: {}",
                filename,
                ALLOWED_EXTENSIONS.join(", ")
            ),
        )
        .into(),
    )
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

async fn field_text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart field: {}", e)))
}

/// Stream one multipart field to `path`, enforcing `max_bytes`
async fn stage_upload(mut field: Field<'_>, path: &Path, max_bytes: u64) -> ApiResult<u64> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Upload interrupted: {}", e)))?
    {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Upload exceeds the {} byte limit",
                max_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn remove_staged_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

/// Build summarization routes
pub fn summarize_routes(max_upload_bytes: u64) -> Router<AppState> {
    let upload_limit = usize::try_from(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/api/summarize", post(summarize))
        .route("/api/summarize/stream", get(summarize_stream))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" ON "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_request_accepts_camel_case_options() {
        let request: SummarizeRequest = serde_json::from_str(
            r#"{
                "source": {"type": "youtube", "data": {"url": "https://youtu.be/abc"}},
                "options": {"maxWords": 100, "returnTranscriptOnly": true}
            }"#,
        )
        .unwrap();

        assert_eq!(request.options.max_words, Some(100));
        assert!(request.options.transcript_only);
    }

    #[test]
    fn test_request_options_default() {
        let request: SummarizeRequest = serde_json::from_str(
            r#"{"source": {"type": "youtube", "data": {"url": "https://youtu.be/abc"}}}"#,
        )
        .unwrap();
        assert_eq!(request.options, SummaryOptions::default());
    }

    #[test]
    fn test_unsupported_format_maps_to_415() {
        let response = unsupported_format("notes.txt").into_response();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }
}
