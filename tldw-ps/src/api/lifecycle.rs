//! Request lifecycle middleware
//!
//! Every request through this layer is admitted into the [`AdmissionQueue`]
//! before reaching a handler, or refused with 503 without touching the
//! pipeline. The admission entry is owned by a guard that travels with the
//! response body, so it is released exactly once when the body finishes, the
//! client disconnects, or the handler fails.
//!
//! Non-streaming requests are bounded by the request timeout until response
//! headers are produced; on expiry the client gets 408 and the entry is
//! released. Handlers run their pipeline on a spawned task, so the job itself
//! keeps running and still cleans up. Event-stream requests are exempt.

use super::wants_event_stream;
use crate::error::ApiError;
use crate::services::AdmissionQueue;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use uuid::Uuid;

/// Tower layer for admission control and request timeouts
#[derive(Clone)]
pub struct RequestLifecycleLayer {
    queue: Arc<AdmissionQueue>,
    request_timeout: Duration,
}

impl RequestLifecycleLayer {
    pub fn new(queue: Arc<AdmissionQueue>, request_timeout: Duration) -> Self {
        Self {
            queue,
            request_timeout,
        }
    }
}

impl<S> Layer<S> for RequestLifecycleLayer {
    type Service = RequestLifecycle<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLifecycle {
            inner,
            queue: Arc::clone(&self.queue),
            request_timeout: self.request_timeout,
        }
    }
}

/// Tower service wrapping one route
#[derive(Clone)]
pub struct RequestLifecycle<S> {
    inner: S,
    queue: Arc<AdmissionQueue>,
    request_timeout: Duration,
}

impl<S> Service<Request> for RequestLifecycle<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let queue = Arc::clone(&self.queue);
        let request_timeout = self.request_timeout;
        // Call the instance that poll_ready readied; leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);

            // Check and insert happen under one lock inside try_admit
            if !queue.try_admit(&request_id, remote_addr) {
                tracing::warn!(
                    path = %request.uri().path(),
                    remote_addr = ?remote_addr,
                    limit = queue.limit(),
                    "Request refused: server at capacity"
                );
                return Ok(ApiError::CapacityExceeded(format!(
                    "{} jobs already in progress, retry later",
                    queue.limit()
                ))
                .into_response());
            }

            let guard = ReleaseGuard {
                queue,
                request_id,
            };

            if wants_event_stream(request.headers()) {
                let response = inner.call(request).await?;
                return Ok(attach_guard(response, guard));
            }

            match tokio::time::timeout(request_timeout, inner.call(request)).await {
                Ok(result) => Ok(attach_guard(result?, guard)),
                Err(_) => {
                    tracing::warn!(
                        request_id = %guard.request_id,
                        timeout_secs = request_timeout.as_secs(),
                        "Request timed out before response started"
                    );
                    drop(guard);
                    Ok(ApiError::RequestTimeout(request_timeout.as_secs()).into_response())
                }
            }
        })
    }
}

/// Releases an admission entry when dropped
struct ReleaseGuard {
    queue: Arc<AdmissionQueue>,
    request_id: String,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.queue.release(&self.request_id);
    }
}

/// Tie `guard` to the lifetime of the response body
fn attach_guard(response: Response, guard: ReleaseGuard) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        let _ = &guard;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(queue: Arc<AdmissionQueue>, timeout: Duration) -> Router {
        Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }),
            )
            .layer(RequestLifecycleLayer::new(queue, timeout))
    }

    fn get_request(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_entry_released_after_body_consumed() {
        let queue = Arc::new(AdmissionQueue::new(1, Duration::from_secs(300)));
        let app = app(Arc::clone(&queue), Duration::from_secs(300));

        let response = app.clone().oneshot(get_request("/fast")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(queue.len(), 1, "entry held until body finishes");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
        assert!(queue.is_empty());

        let response = app.oneshot(get_request("/fast")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Answers 200 only when `call` lands on the instance `poll_ready` readied
    struct ReadyOnce {
        ready: bool,
    }

    impl Clone for ReadyOnce {
        fn clone(&self) -> Self {
            Self { ready: false }
        }
    }

    impl Service<Request> for ReadyOnce {
        type Response = Response;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.ready = true;
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _request: Request) -> Self::Future {
            let status = if std::mem::take(&mut self.ready) {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            std::future::ready(Ok(status.into_response()))
        }
    }

    #[tokio::test]
    async fn test_calls_the_readied_inner_service() {
        let queue = Arc::new(AdmissionQueue::new(2, Duration::from_secs(300)));
        let service = RequestLifecycleLayer::new(Arc::clone(&queue), Duration::from_secs(300))
            .layer(ReadyOnce { ready: false });

        let response = service.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        drop(response);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_refuses_when_full() {
        let queue = Arc::new(AdmissionQueue::new(1, Duration::from_secs(300)));
        let app = app(Arc::clone(&queue), Duration::from_secs(300));

        let held = app.clone().oneshot(get_request("/fast")).await.unwrap();
        let refused = app.oneshot(get_request("/fast")).await.unwrap();

        assert_eq!(refused.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = refused.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "CAPACITY_EXCEEDED");

        drop(held);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_408_and_releases() {
        let queue = Arc::new(AdmissionQueue::new(1, Duration::from_secs(300)));
        let app = app(Arc::clone(&queue), Duration::from_secs(5));

        let response = app.oneshot(get_request("/slow")).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_stream_exempt_from_timeout() {
        let queue = Arc::new(AdmissionQueue::new(1, Duration::from_secs(300)));
        let app = app(Arc::clone(&queue), Duration::from_secs(5));

        let request = Request::builder()
            .uri("/slow")
            .header("accept", "text/event-stream")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"late");
        assert!(queue.is_empty());
    }
}
