//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for tldw services.

use crate::events::Progress;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keep-alive interval for progress streams
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Turn a job's progress receiver into an SSE response
///
/// Each [`Progress`] becomes one unnamed `data:` frame holding its JSON encoding.
/// The stream ends right after the first terminal (`done` / `error`) frame, or
/// when the sender side is dropped.
///
/// # Example
/// ```rust,ignore
/// let rx = orchestrator.subscribe();
/// tokio::spawn(async move { orchestrator.process(source, options).await });
/// tldw_common::sse::progress_sse_stream(job_id.to_string(), rx)
/// ```
pub fn progress_sse_stream(
    job_id: String,
    mut rx: mpsc::UnboundedReceiver<Progress>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(job_id = %job_id, "SSE client subscribed to job progress");

    let stream = async_stream::stream! {
        while let Some(progress) = rx.recv().await {
            let terminal = progress.is_terminal();

            match serde_json::to_string(&progress) {
                Ok(json) => {
                    debug!(job_id = %job_id, status = %progress.status, progress = progress.progress, "SSE: Sending progress frame");
                    yield Ok(Event::default().data(json));
                }
                Err(e) => {
                    warn!(job_id = %job_id, "SSE: Failed to serialize progress: {}", e);
                }
            }

            if terminal {
                break;
            }
        }

        debug!(job_id = %job_id, "SSE: Progress stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}
