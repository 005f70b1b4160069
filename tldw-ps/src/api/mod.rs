//! HTTP API handlers for tldw-ps
//!
//! `/api/*` routes run behind [`RequestLifecycleLayer`]; `/health` does not.

pub mod health;
pub mod lifecycle;
pub mod summarize;

pub use health::health_routes;
pub use lifecycle::RequestLifecycleLayer;
pub use summarize::summarize_routes;

use axum::http::{header::ACCEPT, HeaderMap};

/// Whether the client asked for a server-sent event stream
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_event_stream() {
        let mut headers = HeaderMap::new();
        assert!(!wants_event_stream(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_event_stream(&headers));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/event-stream, */*;q=0.1"),
        );
        assert!(wants_event_stream(&headers));
    }
}
