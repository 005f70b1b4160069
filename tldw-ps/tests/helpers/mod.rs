//! Test Helper Utilities
//!
//! Stub collaborators and a router harness for tldw-ps integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tldw_common::config::{RetryToml, TomlConfig};
use tldw_common::Progress;
use tldw_ps::config::{Args, ServiceConfig};
use tldw_ps::error::{StageError, StageErrorCode};
use tldw_ps::models::{
    MediaMetadata, ProcessedMedia, Source, SourceKind, Stage, Summary, SummaryOptions, Transcript,
};
use tldw_ps::services::{
    DefaultPipelineFactory, MediaProcessor, ProgressTracker, SummarizationService,
    TranscriptionService, UploadedFileProcessor,
};
use tldw_ps::{build_router, AppState};
use tokio::sync::Notify;

/// YouTube-style media stub
///
/// Optionally waits on `gate` before finishing so tests can hold a job open.
pub struct StubMedia {
    pub media_id: String,
    pub fail_with: Option<StageErrorCode>,
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicU32,
    pub cleaned: Mutex<Vec<String>>,
}

impl StubMedia {
    pub fn new(media_id: &str) -> Self {
        Self {
            media_id: media_id.to_string(),
            fail_with: None,
            gate: None,
            calls: AtomicU32::new(0),
            cleaned: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaProcessor for StubMedia {
    fn name(&self) -> &'static str {
        "stub-youtube"
    }

    async fn process_media(
        &self,
        _source: &Source,
        progress: &ProgressTracker,
    ) -> Result<ProcessedMedia, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.update_progress(Stage::Media, 50.0);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(code) = self.fail_with {
            return Err(StageError::new(code, "stub media failure"));
        }

        progress.update_progress(Stage::Audio, 100.0);
        Ok(ProcessedMedia {
            id: self.media_id.clone(),
            audio_path: PathBuf::from(format!("/nonexistent/{}.mp3", self.media_id)),
            metadata: MediaMetadata {
                duration_secs: 0.0,
                format: "mp3".to_string(),
                size_bytes: 2048,
            },
        })
    }

    async fn cleanup(&self, media_id: &str) -> Result<(), StageError> {
        self.cleaned.lock().unwrap().push(media_id.to_string());
        Ok(())
    }
}

/// Returns a fixed transcript
pub struct StubTranscriber {
    pub text: String,
    pub fail_with: Option<StageErrorCode>,
}

#[async_trait]
impl TranscriptionService for StubTranscriber {
    async fn transcribe(
        &self,
        _media: &ProcessedMedia,
        progress: &ProgressTracker,
    ) -> Result<Transcript, StageError> {
        if let Some(code) = self.fail_with {
            return Err(StageError::new(code, "stub transcription failure"));
        }
        progress.update_progress(Stage::Transcription, 50.0);
        Ok(Transcript {
            text: self.text.clone(),
            segments: Vec::new(),
        })
    }
}

/// Echoes the first `max_words` transcript words
pub struct StubSummarizer {
    pub calls: AtomicU32,
    pub last_options: Mutex<Option<SummaryOptions>>,
}

#[async_trait]
impl SummarizationService for StubSummarizer {
    async fn summarize(
        &self,
        transcript: &Transcript,
        options: &SummaryOptions,
        source_type: SourceKind,
        source_id: &str,
    ) -> Result<Summary, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());

        let words: Vec<&str> = transcript
            .text
            .split_whitespace()
            .take(options.max_words.unwrap_or(usize::MAX))
            .collect();
        Ok(Summary::new(words.join(" "), source_type, source_id))
    }
}

/// Test harness settings
pub struct TestAppOptions {
    pub max_concurrent_jobs: usize,
    pub request_timeout_secs: u64,
    pub media: StubMedia,
    pub transcript: String,
    pub transcription_error: Option<StageErrorCode>,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            request_timeout_secs: 300,
            media: StubMedia::new("abc"),
            transcript: "hello world".to_string(),
            transcription_error: None,
        }
    }
}

/// Router plus handles on its collaborators
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub media: Arc<StubMedia>,
    pub summarizer: Arc<StubSummarizer>,
    pub work_dir: PathBuf,
    pub uploads_dir: PathBuf,
    _temp: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestAppOptions::default())
    }

    pub fn with_options(options: TestAppOptions) -> Self {
        let temp = TempDir::new().unwrap();
        let work_dir = temp.path().join("work");
        let uploads_dir = temp.path().join("uploads");

        let args = Args {
            max_concurrent_jobs: Some(options.max_concurrent_jobs),
            request_timeout_secs: Some(options.request_timeout_secs),
            work_dir: Some(work_dir.clone()),
            uploads_dir: Some(uploads_dir.clone()),
            max_upload_bytes: Some(1024 * 1024),
            ..Args::default()
        };
        let toml = TomlConfig {
            default_max_words: Some(50),
            retry: RetryToml {
                max_attempts: Some(2),
                initial_delay_ms: Some(5),
                max_delay_ms: Some(10),
                timeout_ms: Some(5_000),
            },
            ..TomlConfig::default()
        };
        let config = ServiceConfig::resolve(&args, &toml).unwrap();

        let media = Arc::new(options.media);
        let summarizer = Arc::new(StubSummarizer {
            calls: AtomicU32::new(0),
            last_options: Mutex::new(None),
        });
        let factory = DefaultPipelineFactory::new(
            media.clone(),
            Arc::new(UploadedFileProcessor::new(
                work_dir.clone(),
                config.max_upload_bytes,
            )),
            Arc::new(StubTranscriber {
                text: options.transcript,
                fail_with: options.transcription_error,
            }),
            summarizer.clone(),
        );

        let state = AppState::new(config, Arc::new(factory));
        let router = build_router(state.clone());

        Self {
            router,
            state,
            media,
            summarizer,
            work_dir,
            uploads_dir,
            _temp: temp,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// JSON POST request
pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// `POST /api/summarize` body for a YouTube URL
pub fn youtube_body(url: &str, options: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "source": {"type": "youtube", "data": {"url": url}},
        "options": options,
    })
}

pub const BOUNDARY: &str = "tldw-test-boundary";

/// Multipart body with one file part and optional text fields
pub fn multipart_body(filename: &str, content: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Upload request built from [`multipart_body`]
pub fn upload_request(body: Vec<u8>, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(accept) = accept {
        builder = builder.header("accept", accept);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse every `data:` frame of an SSE body as a [`Progress`]
pub async fn sse_events(response: Response) -> Vec<Progress> {
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
