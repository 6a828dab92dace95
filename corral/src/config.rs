use std::time::Duration;

use corral_api::{ConfigError, IdKind, RejectPolicy, RetryOption, TimeoutOption};

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(10);
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "corral-worker";

// --- Configuration Enums ---

/// Ordering applied within one priority level of a stealable collection.
///
/// | discipline | `get` (owner)  | `steal` (peer) |
/// |------------|----------------|----------------|
/// | `Fifo`     | oldest first   | oldest first   |
/// | `Lifo`     | newest first   | newest first   |
/// | `Deque`    | newest first   | oldest first   |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QueueDiscipline {
    #[default]
    Fifo,
    Lifo,
    Deque,
}

/// How much an idle worker takes from a peer in one steal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StealPolicy {
    /// A single item.
    #[default]
    One,
    /// Up to half of the victim's backlog; the rest goes into the thief's own queue.
    Half,
}

// --- Pool Configuration ---

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Upper bound on shared workers. Dedicated long-running workers are not counted against it.
    pub max_threads: usize,

    /// Workers kept alive even when idle.
    pub min_threads: usize,

    /// How long an idle worker above `min_threads` waits for work before retiring.
    pub keep_alive: Duration,

    /// Ordering within one priority level.
    pub discipline: QueueDiscipline,

    pub steal_policy: StealPolicy,

    /// Bound on the shared backlog; `None` is unbounded.
    pub queue_limit: Option<usize>,

    /// Applied when `queue_limit` is reached.
    pub reject_policy: RejectPolicy,

    /// Kind of id generated for items submitted without a custom id.
    pub id_kind: IdKind,

    /// Accept submissions but hold them until `start()` is called.
    pub start_suspended: bool,

    /// Default per-item timeout.
    pub work_timeout: Option<TimeoutOption>,

    /// Timeout for one busy period of the whole pool.
    pub pool_timeout: Option<TimeoutOption>,

    /// Default retry for items that do not set one.
    pub default_retry: Option<RetryOption>,

    /// Keep results after callbacks run, so they can be fetched.
    pub retain_results: bool,

    /// Join worker threads running foreground items when disposing.
    pub join_on_dispose: bool,

    pub thread_name_prefix: String,

    pub thread_stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get() * 2,
            min_threads: 0,
            keep_alive: DEFAULT_KEEP_ALIVE,
            discipline: QueueDiscipline::default(),
            steal_policy: StealPolicy::default(),
            queue_limit: None,
            reject_policy: RejectPolicy::default(),
            id_kind: IdKind::Sequential,
            start_suspended: false,
            work_timeout: None,
            pool_timeout: None,
            default_retry: None,
            retain_results: true,
            join_on_dispose: true,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            thread_stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroMaxThreads);
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_threads,
                max: self.max_threads,
            });
        }
        if self.queue_limit == Some(0) {
            return Err(ConfigError::ZeroQueueLimit);
        }
        if self.id_kind == IdKind::Name {
            return Err(ConfigError::UnsupportedIdKind(IdKind::Name));
        }
        Ok(())
    }

    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    pub fn with_min_threads(mut self, min: usize) -> Self {
        self.min_threads = min;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_discipline(mut self, discipline: QueueDiscipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_steal_policy(mut self, policy: StealPolicy) -> Self {
        self.steal_policy = policy;
        self
    }

    pub fn with_queue_limit(mut self, limit: usize, policy: RejectPolicy) -> Self {
        self.queue_limit = Some(limit);
        self.reject_policy = policy;
        self
    }

    pub fn with_id_kind(mut self, kind: IdKind) -> Self {
        self.id_kind = kind;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }

    pub fn with_work_timeout(mut self, timeout: TimeoutOption) -> Self {
        self.work_timeout = Some(timeout);
        self
    }

    pub fn with_pool_timeout(mut self, timeout: TimeoutOption) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    pub fn with_default_retry(mut self, retry: RetryOption) -> Self {
        self.default_retry = Some(retry);
        self
    }

    pub fn retain_results(mut self, retain: bool) -> Self {
        self.retain_results = retain;
        self
    }

    pub fn join_on_dispose(mut self, join: bool) -> Self {
        self.join_on_dispose = join;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }
}
