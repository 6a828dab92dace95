use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime};

use corral_api::{
    RetryOption, ThreadPriority, TimeoutOption, WorkCallback, WorkId, WorkOptions, WorkPlacement,
    WorkResult, WorkStatus, WorkValue,
};
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::control::ItemControl;
use crate::signal::{AsyncManualResetEvent, ManualResetEvent};
use crate::state::AtomicState;
use crate::timer::TimerHandle;

/// Type-erased user callback. `FnMut` so an immediate retry can call it again.
pub(crate) type Job = Box<dyn FnMut() -> anyhow::Result<WorkValue> + Send>;

#[derive(Debug, Clone, Copy)]
struct Times {
    queued_at: Instant,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
}

/// One submitted unit of work.
///
/// Shared as `Arc<WorkItem>` between the registry, queues and the executing
/// thread. The status field decides ownership: only the thread that moves it
/// `Waiting → Running` executes the callback.
pub(crate) struct WorkItem {
    pub id: WorkId,
    pub priority: i32,
    pub group: Option<String>,
    pub dependencies: HashSet<WorkId>,
    pub retry: Option<RetryOption>,
    pub timeout: Option<TimeoutOption>,
    pub long_running: bool,
    pub placement: WorkPlacement,
    pub thread_priority: ThreadPriority,
    pub background: bool,
    pub retain_result: bool,
    pub callback: Option<WorkCallback>,
    pub control: Arc<ItemControl>,
    status: AtomicState<WorkStatus>,
    job: Mutex<Option<Job>>,
    retries: AtomicU32,
    stop_retry: Arc<AtomicBool>,
    submitted_at: SystemTime,
    times: Mutex<Times>,
    timeout_timer: Mutex<Option<TimerHandle>>,
    final_result: Mutex<Option<WorkResult>>,
    done: ManualResetEvent,
    done_async: AsyncManualResetEvent,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .field("status", &self.status)
            .field("retries", &self.retries.load(Ordering::Relaxed))
            .finish()
    }
}

impl WorkItem {
    /// Build an item, falling back to the pool's defaults for unset options.
    pub fn new(id: WorkId, options: WorkOptions, config: &PoolConfig, job: Job) -> Self {
        Self {
            id,
            priority: options.priority,
            group: options.group,
            dependencies: options.dependencies,
            retry: options.retry.or(config.default_retry),
            timeout: options.timeout.or(config.work_timeout),
            long_running: options.long_running,
            placement: options.placement,
            thread_priority: options.thread_priority,
            background: options.background,
            retain_result: options.retain_result.unwrap_or(config.retain_results),
            callback: options.callback,
            control: Arc::new(ItemControl::new()),
            status: AtomicState::new(WorkStatus::Waiting),
            job: Mutex::new(Some(job)),
            retries: AtomicU32::new(0),
            stop_retry: Arc::new(AtomicBool::new(false)),
            submitted_at: SystemTime::now(),
            times: Mutex::new(Times {
                queued_at: Instant::now(),
                started_at: None,
                ended_at: None,
            }),
            timeout_timer: Mutex::new(None),
            final_result: Mutex::new(None),
            done: ManualResetEvent::new(false),
            done_async: AsyncManualResetEvent::new(false),
        }
    }

    pub fn status(&self) -> WorkStatus {
        self.status.load()
    }

    pub fn transition(&self, from: WorkStatus, to: WorkStatus) -> bool {
        self.status.transition(from, to)
    }

    pub fn transition_any(&self, from: &[WorkStatus], to: WorkStatus) -> Option<WorkStatus> {
        self.status.transition_any(from, to)
    }

    /// Claim the item for execution.
    pub fn claim(&self) -> bool {
        self.status.transition(WorkStatus::Waiting, WorkStatus::Running)
    }

    pub fn is_waiting(&self) -> bool {
        self.status() == WorkStatus::Waiting
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Acquire)
    }

    pub fn count_retry(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn retry_stopped(&self) -> bool {
        self.stop_retry.load(Ordering::SeqCst)
    }

    pub fn mark_started(&self) {
        let mut times = self.times.lock();
        times.started_at = Some(Instant::now());
        times.ended_at = None;
    }

    pub fn mark_ended(&self) {
        self.times.lock().ended_at = Some(Instant::now());
    }

    /// Reset timestamps for a requeue retry.
    pub fn mark_requeued(&self) {
        let mut times = self.times.lock();
        times.queued_at = Instant::now();
        times.started_at = None;
        times.ended_at = None;
    }

    /// Run the callback once. The caller owns the item (it claimed it).
    pub fn invoke(&self) -> anyhow::Result<WorkValue> {
        let mut job = self.job.lock();
        match job.as_mut() {
            Some(job) => job(),
            None => anyhow::bail!("work callback of {} already released", self.id),
        }
    }

    /// Drop the callback and whatever it captured.
    pub fn release_job(&self) {
        self.job.lock().take();
    }

    /// Snapshot a result carrying this item's timestamps and retry flag.
    pub fn result(
        &self,
        status: WorkStatus,
        value: Option<WorkValue>,
        error: Option<Arc<anyhow::Error>>,
    ) -> WorkResult {
        let times = *self.times.lock();
        let mut result = WorkResult::new(self.id.clone(), status)
            .with_retry_flag(Arc::clone(&self.stop_retry));
        result.value = value;
        result.error = error;
        result.retries = self.retries();
        result.submitted_at = self.submitted_at;
        result.queued_at = times.queued_at;
        result.started_at = times.started_at;
        result.ended_at = times.ended_at;
        result
    }

    pub fn arm_timeout(&self, handle: TimerHandle) {
        if let Some(previous) = self.timeout_timer.lock().replace(handle) {
            previous.cancel();
        }
    }

    pub fn disarm_timeout(&self) {
        if let Some(handle) = self.timeout_timer.lock().take() {
            handle.cancel();
        }
    }

    /// Store the terminal result and drop the callback. Waiters stay blocked
    /// until [`release_waiters`](Self::release_waiters).
    pub fn complete(&self, result: WorkResult) {
        *self.final_result.lock() = Some(result);
        self.release_job();
    }

    pub fn release_waiters(&self) {
        self.done.set();
        self.done_async.set();
    }

    pub fn is_done(&self) -> bool {
        self.done.is_set()
    }

    pub fn final_result(&self) -> Option<WorkResult> {
        self.final_result.lock().clone()
    }

    pub fn wait_done_timeout(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }

    pub async fn wait_done_async(&self) {
        self.done_async.wait().await
    }
}
