//! Per-job progress tracking
//!
//! Maps `(stage, in-stage percent)` onto one overall percentage, fans every
//! event out to the job's observers and owns the terminal transition.
//!
//! # Guarantees
//! - Non-error events never go backwards: a computed value below the last
//!   emitted one is replaced by the last emitted one.
//! - At most one terminal event (`done` or `error`). The completed flag is
//!   checked and set under the same lock that serializes emission, so nothing
//!   is delivered after the terminal event.
//! - Cleanup tasks run once, concurrently, after the terminal event. A failing
//!   (or panicking) cleanup task is logged and never changes the job outcome.
//!
//! Observers run synchronously while the tracker lock is held and must not
//! call back into the tracker.

use crate::models::Stage;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tldw_common::{Error, Progress, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Synchronous progress callback
pub type Observer = Box<dyn Fn(&Progress) + Send + Sync>;

type CleanupTask = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Stable code used when a caller reports a failure without classifying it
pub const UNCLASSIFIED_ERROR_CODE: &str = "INTERNAL_ERROR";

struct TrackerState {
    current_stage: Option<Stage>,
    last_progress: u8,
    completed: bool,
    observers: Vec<Observer>,
    cleanup_tasks: Vec<CleanupTask>,
    last_error: Option<String>,
}

/// Progress tracker for one job
pub struct ProgressTracker {
    job_id: Uuid,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            state: Mutex::new(TrackerState {
                current_stage: None,
                last_progress: 0,
                completed: false,
                observers: Vec::new(),
                cleanup_tasks: Vec::new(),
                last_error: None,
            }),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // A panicking observer must not wedge the job
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback invoked for every emitted event, in registration order
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.lock().observers.push(Box::new(observer));
    }

    /// Subscribe through a lossless channel
    ///
    /// The receiver yields every event emitted after this call, ending with the
    /// terminal event; the channel closes once the tracker is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Progress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_observer(move |progress| {
            // Receiver gone means the client went away; nothing to do
            let _ = tx.send(progress.clone());
        });
        rx
    }

    /// Register an async cleanup action to run once after the terminal event
    ///
    /// Registering after the job already finished runs the task right away on
    /// the current runtime.
    pub fn add_cleanup_task<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task: CleanupTask = Box::new(move || task().boxed());

        let mut state = self.lock();
        if !state.completed {
            state.cleanup_tasks.push(task);
            return;
        }
        drop(state);

        tracing::warn!(job_id = %self.job_id, "Cleanup task registered after completion, running now");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let job_id = self.job_id;
                handle.spawn(async move { run_cleanup_tasks(job_id, vec![task]).await });
            }
            Err(_) => {
                tracing::error!(job_id = %self.job_id, "No runtime available, cleanup task dropped");
            }
        }
    }

    /// Report in-stage progress
    ///
    /// No-op after the terminal event. `stage_percent` is clamped to 0-100.
    /// The `done` stage is reserved for [`ProgressTracker::complete`].
    pub fn update_progress(&self, stage: Stage, stage_percent: f64) {
        if stage == Stage::Done {
            tracing::warn!(job_id = %self.job_id, "Ignoring progress update on reserved 'done' stage");
            return;
        }

        let mut state = self.lock();
        if state.completed {
            tracing::trace!(job_id = %self.job_id, stage = %stage, "Progress update after completion ignored");
            return;
        }

        let percent = if stage_percent.is_nan() {
            0.0
        } else {
            stage_percent.clamp(0.0, 100.0)
        };
        let computed = stage.overall_progress(percent);
        let overall = computed.max(state.last_progress);

        let event = Progress::update(
            stage.config().status,
            stage.message(percent.round() as u8),
            overall,
        );

        tracing::debug!(
            job_id = %self.job_id,
            stage = %stage,
            stage_percent = percent,
            progress = overall,
            "Progress update"
        );

        for observer in &state.observers {
            observer(&event);
        }

        state.last_progress = overall;
        state.current_stage = Some(stage);
    }

    /// Report in-stage progress by stage name
    ///
    /// Unknown names (and the reserved `done` stage) are programming errors.
    pub fn update_progress_named(&self, stage_name: &str, stage_percent: f64) -> Result<()> {
        let stage: Stage = stage_name.parse()?;
        if stage == Stage::Done {
            return Err(Error::InvalidInput(
                "Stage 'done' is reserved for job completion".to_string(),
            ));
        }
        self.update_progress(stage, stage_percent);
        Ok(())
    }

    /// Emit the terminal `done` event, then run cleanup tasks
    pub async fn complete(&self, final_content: &str) {
        let tasks = {
            let mut state = self.lock();
            if state.completed {
                tracing::debug!(job_id = %self.job_id, "complete() after terminal event ignored");
                return;
            }
            state.completed = true;

            let event = Progress::done(final_content);
            for observer in &state.observers {
                observer(&event);
            }
            state.last_progress = 100;
            state.current_stage = Some(Stage::Done);

            std::mem::take(&mut state.cleanup_tasks)
        };

        tracing::info!(job_id = %self.job_id, "Job completed");
        run_cleanup_tasks(self.job_id, tasks).await;
    }

    /// Emit an unclassified terminal `error` event, then run cleanup tasks
    pub async fn error(&self, raw_message: &str) {
        self.error_with_code(UNCLASSIFIED_ERROR_CODE, raw_message)
            .await
    }

    /// Emit the terminal `error` event, then run cleanup tasks
    ///
    /// Observers only see a generic message plus `code`; `raw_message` is kept
    /// for diagnostics ([`ProgressTracker::last_error`]) and logs.
    pub async fn error_with_code(&self, code: &str, raw_message: &str) {
        let tasks = {
            let mut state = self.lock();
            if state.completed {
                tracing::debug!(job_id = %self.job_id, code, "error() after terminal event ignored");
                return;
            }
            state.completed = true;
            state.last_error = Some(raw_message.to_string());

            tracing::error!(
                job_id = %self.job_id,
                code,
                stage = ?state.current_stage.map(Stage::name),
                progress = state.last_progress,
                error = raw_message,
                "Job failed"
            );

            let event = Progress::failed(code, state.last_progress);
            for observer in &state.observers {
                observer(&event);
            }

            std::mem::take(&mut state.cleanup_tasks)
        };

        run_cleanup_tasks(self.job_id, tasks).await;
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// Last emitted overall progress
    pub fn last_progress(&self) -> u8 {
        self.lock().last_progress
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.lock().current_stage
    }

    /// Raw failure message passed to `error()`, for diagnostics only
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }
}

/// Run cleanup tasks concurrently; failures and panics are logged, never propagated
async fn run_cleanup_tasks(job_id: Uuid, tasks: Vec<CleanupTask>) {
    if tasks.is_empty() {
        return;
    }

    let count = tasks.len();
    tracing::debug!(job_id = %job_id, count, "Running cleanup tasks");

    let outcomes = join_all(tasks.into_iter().enumerate().map(|(index, task)| async move {
        match AssertUnwindSafe(task()).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, task = index, error = %e, "Cleanup task failed");
                false
            }
            Err(_) => {
                tracing::error!(job_id = %job_id, task = index, "Cleanup task panicked");
                false
            }
        }
    }))
    .await;

    let failed = outcomes.iter().filter(|ok| !**ok).count();
    if failed > 0 {
        tracing::warn!(job_id = %job_id, failed, total = count, "Cleanup finished with failures");
    } else {
        tracing::debug!(job_id = %job_id, total = count, "Cleanup finished");
    }
}
