//! # Work Options
//!
//! Per-item metadata supplied at submission. Every field has a neutral
//! default, so `WorkOptions::default()` describes a plain priority-0 item with
//! a pool-generated id, no group, no dependencies, and no retry or timeout.
//! Where a field is `Option`, `None` means "use the pool's configured
//! default".
//!
//! ## Usage Example
//!
//! ```rust
//! use std::time::Duration;
//! use corral_api::{RetryBehavior, RetryOption, TimeoutOption, WorkOptions};
//!
//! let options = WorkOptions::default()
//!     .with_priority(5)
//!     .depends_on("extract")
//!     .depends_on("transform")
//!     .with_retry(RetryOption::limited(2).with_behavior(RetryBehavior::Requeue))
//!     .with_timeout(TimeoutOption::soft(Duration::from_secs(30)));
//!
//! assert_eq!(options.dependencies.len(), 2);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::id::WorkId;
use crate::result::WorkResult;

/// Per-item completion callback. Runs on the executing thread after the
/// `WorkEnded` event; an `Err` is reported through the pool's error channel.
pub type WorkCallback = Arc<dyn Fn(&WorkResult) -> anyhow::Result<()> + Send + Sync>;

/// How many times a failed item is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most this many retries after the first attempt.
    Limited(u32),
    /// Until a callback or event handler calls [`WorkResult::stop_retry`].
    Unlimited,
}

/// Where a retry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryBehavior {
    /// Re-invoke the callback in place on the same thread.
    #[default]
    Immediate,
    /// Put the item back in the queue as a fresh waiting item.
    Requeue,
}

/// Retry configuration for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOption {
    pub policy: RetryPolicy,
    pub behavior: RetryBehavior,
}

impl RetryOption {
    pub fn limited(max_retries: u32) -> Self {
        Self {
            policy: RetryPolicy::Limited(max_retries),
            behavior: RetryBehavior::default(),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            policy: RetryPolicy::Unlimited,
            behavior: RetryBehavior::default(),
        }
    }

    pub fn with_behavior(mut self, behavior: RetryBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Whether another attempt is allowed after `retries_done` retries.
    ///
    /// `stop_requested` is the stop-retry flag raised from a callback or
    /// event handler; it ends both limited and unlimited policies.
    pub fn should_retry(&self, retries_done: u32, stop_requested: bool) -> bool {
        if stop_requested {
            return false;
        }
        match self.policy {
            RetryPolicy::Limited(max) => retries_done < max,
            RetryPolicy::Unlimited => true,
        }
    }
}

/// Timeout configuration for an item or the whole pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutOption {
    pub duration: Duration,
    /// `true` escalates to a forced stop, `false` requests a cooperative stop.
    pub force: bool,
}

impl TimeoutOption {
    pub fn soft(duration: Duration) -> Self {
        Self { duration, force: false }
    }

    pub fn forced(duration: Duration) -> Self {
        Self { duration, force: true }
    }
}

/// Backpressure policy applied when the shared backlog is at its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RejectPolicy {
    /// Fail the submission with `SubmitError::Rejected`.
    #[default]
    Abort,
    /// Run the item synchronously on the submitting thread.
    CallerRuns,
    /// Drop the new item.
    Discard,
    /// Evict the most recent lowest-priority waiting item, then queue the new one.
    DiscardOldest,
}

/// Where a newly submitted item should be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkPlacement {
    /// An idle worker if there is one, otherwise the submitting worker's own
    /// queue when submitted from inside a work item, otherwise the shared queue.
    #[default]
    PreferIdleThenLocal,
    /// The submitting worker's own queue when submitted from inside a work item.
    PreferLocal,
    /// An idle or new worker; never the submitting worker's queue.
    PreferIdle,
}

/// OS scheduling priority hint for the thread that runs the item.
///
/// Recorded on the item and reported in logs; the standard library exposes no
/// portable way to change a running thread's priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPriority {
    Lowest,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    Highest,
}

/// Metadata supplied with a submission.
#[derive(Clone, Default)]
pub struct WorkOptions {
    /// Caller-supplied identifier; the pool generates one when `None`.
    pub custom_id: Option<WorkId>,
    /// Higher runs first within a queue.
    pub priority: i32,
    /// Group the item joins on submission.
    pub group: Option<String>,
    /// Items that must succeed before this one is released.
    pub dependencies: HashSet<WorkId>,
    pub retry: Option<RetryOption>,
    pub timeout: Option<TimeoutOption>,
    /// Run on a dedicated thread outside the shared worker set.
    pub long_running: bool,
    pub placement: WorkPlacement,
    pub thread_priority: ThreadPriority,
    /// Background items are not waited for when the pool is disposed.
    pub background: bool,
    /// Keep the result after callbacks run; `None` uses the pool setting.
    pub retain_result: Option<bool>,
    pub callback: Option<WorkCallback>,
}

impl fmt::Debug for WorkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkOptions")
            .field("custom_id", &self.custom_id)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .field("dependencies", &self.dependencies)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("long_running", &self.long_running)
            .field("placement", &self.placement)
            .field("thread_priority", &self.thread_priority)
            .field("background", &self.background)
            .field("retain_result", &self.retain_result)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl WorkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<WorkId>) -> Self {
        self.custom_id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<WorkId>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryOption) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutOption) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    pub fn with_placement(mut self, placement: WorkPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_thread_priority(mut self, priority: ThreadPriority) -> Self {
        self.thread_priority = priority;
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn retain_result(mut self, retain: bool) -> Self {
        self.retain_result = Some(retain);
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&WorkResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}
