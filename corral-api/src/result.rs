//! Execution results.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::id::WorkId;
use crate::status::WorkStatus;

/// Type-erased value returned by a work callback.
pub type WorkValue = Arc<dyn Any + Send + Sync>;

/// Record of one execution attempt (or of an item that never ran).
///
/// Results are cheap to clone; the value and error are shared.
#[derive(Clone)]
pub struct WorkResult {
    pub id: WorkId,
    pub status: WorkStatus,
    /// Value returned by the callback; `None` unless the status is `Succeed`.
    pub value: Option<WorkValue>,
    /// Error returned by the callback, or the cause of a non-success terminal state.
    pub error: Option<Arc<anyhow::Error>>,
    /// Number of retries performed before this attempt.
    pub retries: u32,
    /// Wall-clock time of the original submission.
    pub submitted_at: SystemTime,
    /// When the item (re-)entered the queue.
    pub queued_at: Instant,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    stop_retry: Arc<AtomicBool>,
}

impl fmt::Debug for WorkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkResult")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("value", &self.value.as_ref().map(|_| "<value>"))
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .field("retries", &self.retries)
            .field("queued_at", &self.queued_at)
            .field("started_at", &self.started_at)
            .field("ended_at", &self.ended_at)
            .finish()
    }
}

impl WorkResult {
    /// A result with no value, error or execution timestamps.
    pub fn new(id: WorkId, status: WorkStatus) -> Self {
        Self {
            id,
            status,
            value: None,
            error: None,
            retries: 0,
            submitted_at: SystemTime::now(),
            queued_at: Instant::now(),
            started_at: None,
            ended_at: None,
            stop_retry: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an existing stop-retry flag, so that [`stop_retry`](Self::stop_retry)
    /// reaches the item that produced this result.
    pub fn with_retry_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_retry = flag;
        self
    }

    /// Downcast the returned value.
    pub fn value_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.as_ref().and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Time between (re-)queueing and start.
    pub fn queue_wait(&self) -> Option<Duration> {
        self.started_at
            .map(|started| started.saturating_duration_since(self.queued_at))
    }

    /// Time between start and end of the attempt.
    pub fn execution_time(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Stop any further retries of the item that produced this result.
    /// Meant to be called from a completion callback or event handler.
    pub fn stop_retry(&self) {
        self.stop_retry.store(true, Ordering::SeqCst);
    }

    pub fn retry_stopped(&self) -> bool {
        self.stop_retry.load(Ordering::SeqCst)
    }
}
