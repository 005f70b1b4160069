//! Admission queue
//!
//! Bounded set of in-flight requests for one server instance. Admission is a
//! single check-and-insert under one lock, so concurrent arrivals can never
//! push the count past the limit. Entries are released when their response
//! finishes; the sweeper reclaims entries whose release never happened.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One admitted request
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: String,
    pub admitted_at: Instant,
    pub remote_addr: Option<SocketAddr>,
}

/// Bounded in-flight request registry
pub struct AdmissionQueue {
    limit: usize,
    request_timeout: Duration,
    entries: Mutex<HashMap<String, QueueEntry>>,
}

impl AdmissionQueue {
    pub fn new(limit: usize, request_timeout: Duration) -> Self {
        Self {
            limit,
            request_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `id` if there is room
    ///
    /// Returns false when the queue is full or `id` is already admitted.
    pub fn try_admit(&self, id: &str, remote_addr: Option<SocketAddr>) -> bool {
        let mut entries = self.entries();
        if entries.len() >= self.limit || entries.contains_key(id) {
            tracing::debug!(
                request_id = id,
                in_flight = entries.len(),
                limit = self.limit,
                "Admission refused"
            );
            return false;
        }

        entries.insert(
            id.to_string(),
            QueueEntry {
                id: id.to_string(),
                admitted_at: Instant::now(),
                remote_addr,
            },
        );
        tracing::debug!(request_id = id, in_flight = entries.len(), "Request admitted");
        true
    }

    /// Remove `id`; returns whether it was present
    ///
    /// Releasing an unknown (or already swept) id is a no-op.
    pub fn release(&self, id: &str) -> bool {
        let removed = self.entries().remove(id).is_some();
        if removed {
            tracing::debug!(request_id = id, "Request released");
        }
        removed
    }

    /// Drop entries older than the request timeout; returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();

        entries.retain(|id, entry| {
            let age = now.saturating_duration_since(entry.admitted_at);
            let keep = age <= self.request_timeout;
            if !keep {
                tracing::warn!(
                    request_id = %id,
                    remote_addr = ?entry.remote_addr,
                    age_secs = age.as_secs(),
                    "Sweeping stale admission entry"
                );
            }
            keep
        });

        before - entries.len()
    }

    /// Run [`AdmissionQueue::sweep`] every request-timeout interval
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.request_timeout);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let swept = self.sweep();
                if swept > 0 {
                    tracing::info!(swept, in_flight = self.len(), "Admission sweep");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
