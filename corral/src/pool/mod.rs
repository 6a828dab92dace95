//! # Pool
//!
//! The orchestrator: owns the item registry, the global backlog, the worker
//! set, the dependency graph, groups, the event bus and the timer thread.
//!
//! ## Lifecycle
//! ```text
//! Suspended ──start──▶ Running ──stop_all──▶ Stopping
//!     │                 ▲   │                   │
//!     │                 └───┼───── drained ─────┘
//!     └──────dispose────────┴──────────────▶ Disposed
//! ```
//!
//! ## Core Algorithm
//! 1. `submit` validates options, registers the item and its dependencies
//! 2. Ready items are placed: dedicated thread, local queue, idle-worker
//!    handoff, a freshly spawned worker, or the global queue (in that order,
//!    subject to the item's placement hint)
//! 3. Only the global queue is bounded; a full queue applies the reject policy
//! 4. The executing thread runs attempts, callbacks and retries, then records
//!    the result and releases or fails dependent items
//!
//! `pending` counts submitted items that have not finished their terminal
//! callbacks. The pool is idle exactly when it is zero; the transitions into
//! and out of idle raise `PoolIdled` and `PoolStarted`.

mod control;
mod dispatch;
mod executor;
mod results;
mod submit;
mod wait;

pub use wait::WaitOptions;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use corral_api::{
    ConfigError, ControlError, EventKind, PoolEvent, PoolState, WorkCallback, WorkId, WorkResult,
    WorkStatus,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::collection::{self, StealableCollection};
use crate::config::PoolConfig;
use crate::control as checkpoint;
use crate::dependency::DependencyGraph;
use crate::error::PoolError;
use crate::event::{EventBus, ListenerId};
use crate::group::{Group, GroupRegistry, GroupRelations};
use crate::signal::{AsyncManualResetEvent, ManualResetEvent};
use crate::state::AtomicState;
use crate::timer::{Timer, TimerHandle};
use crate::work::WorkItem;
use crate::worker::{CountChange, DedicatedThread, Wake, Worker, WorkerCounter, WorkerCounts};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// One stretch between leaving idle and returning to it.
struct BusyPeriod {
    since: Instant,
    seq: u64,
    /// Pool-wide timeout for this period
    timer: Option<TimerHandle>,
}

pub(crate) struct PoolInner {
    /// Distinguishes this pool's worker threads from other pools'
    pub(crate) id: u64,

    /// Construction-time configuration; thread bounds live in the atomics below
    pub(crate) config: PoolConfig,
    max_threads: AtomicUsize,
    min_threads: AtomicUsize,
    /// Serializes resizes
    resize: Mutex<()>,

    state: AtomicState<PoolState>,

    /// Live (non-terminal or finishing) items
    items: DashMap<WorkId, Arc<WorkItem>>,
    /// Retained terminal results
    results: DashMap<WorkId, WorkResult>,

    /// Shared backlog, bounded by `queue_limit`
    pub(crate) global: Box<dyn StealableCollection<Arc<WorkItem>>>,
    workers: RwLock<Vec<Arc<Worker>>>,
    pub(crate) counts: WorkerCounter,
    pub(crate) dedicated: Mutex<Vec<DedicatedThread>>,

    graph: DependencyGraph,
    pub(crate) groups: GroupRegistry,
    pub(crate) relations: GroupRelations,
    pub(crate) events: EventBus,
    timer: Timer,

    next_seq: AtomicU64,
    next_worker: AtomicUsize,
    /// Submitted items whose terminal callbacks have not finished
    pending: AtomicUsize,
    /// Items currently claimed by an executing thread
    active: AtomicUsize,

    busy: Mutex<Option<BusyPeriod>>,
    next_period: AtomicU64,
    idle: ManualResetEvent,
    idle_async: AsyncManualResetEvent,
    disposed: ManualResetEvent,
    disposed_async: AsyncManualResetEvent,

    /// Set by `pause_all`, applied to items as they are claimed
    paused: AtomicBool,
    /// Attribution of the current `force_stop_all`, cleared on idle
    force_stop_all: AtomicBool,
    default_callback: RwLock<Option<WorkCallback>>,
}

impl PoolInner {
    pub fn state(&self) -> PoolState {
        self.state.load()
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads.load(Ordering::Acquire)
    }

    pub fn min_threads(&self) -> usize {
        self.min_threads.load(Ordering::Acquire)
    }

    /// Snapshot of the shared worker set.
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers.read().clone()
    }

    pub fn remove_worker(&self, id: usize) {
        self.workers.write().retain(|worker| worker.id != id);
    }

    /// Raise `RunningWorkerCountChanged` if the running count moved.
    pub fn count_changed(&self, change: Option<CountChange>) {
        if let Some((previous, current)) = change.and_then(|c| c.running_changed()) {
            trace!(previous, current, "running worker count changed");
            self.events
                .emit(PoolEvent::RunningWorkerCountChanged { previous, current });
        }
    }

    fn item(&self, id: &WorkId) -> Option<Arc<WorkItem>> {
        self.items.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn snapshot_items(&self) -> Vec<Arc<WorkItem>> {
        self.items
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn contains(&self, id: &WorkId) -> bool {
        self.items.contains_key(id) || self.results.contains_key(id)
    }

    fn start(self: &Arc<Self>) -> bool {
        if !self.state.transition(PoolState::Suspended, PoolState::Running) {
            return false;
        }
        info!(pool_id = self.id, max_threads = self.max_threads(), "pool started");
        self.ensure_min_workers();
        self.wake_for_backlog();
        true
    }

    fn ensure_min_workers(self: &Arc<Self>) {
        while self.state() == PoolState::Running && self.counts.shared() < self.min_threads() {
            if !self.spawn_worker(None) {
                break;
            }
        }
    }

    fn acquire_pending(&self) {
        if self.pending.fetch_add(1, Ordering::SeqCst) == 0 {
            let _busy = self.busy.lock();
            if self.pending.load(Ordering::SeqCst) > 0 {
                self.idle.reset();
                self.idle_async.reset();
            }
        }
    }

    /// One item finished its terminal callbacks.
    fn release_pending(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        let ended = {
            let mut busy = self.busy.lock();
            // a submission may have raced in after the decrement
            if self.pending.load(Ordering::SeqCst) != 0 {
                return;
            }
            busy.take()
        };
        if let Some(period) = ended {
            if let Some(timer) = period.timer {
                timer.cancel();
            }
            let busy_for = period.since.elapsed();
            debug!(?busy_for, "pool idle");
            self.events.emit(PoolEvent::PoolIdled { busy_for });
        }

        // waiters are released only after PoolIdled listeners have run
        let _busy = self.busy.lock();
        if self.pending.load(Ordering::SeqCst) == 0 {
            self.force_stop_all.store(false, Ordering::SeqCst);
            self.idle.set();
            self.idle_async.set();
        }
    }

    /// First claim after idle opens a busy period and arms the pool timeout.
    fn enter_busy(self: &Arc<Self>) {
        let started = {
            let mut busy = self.busy.lock();
            if busy.is_some() {
                false
            } else {
                let seq = self.next_period.fetch_add(1, Ordering::Relaxed);
                let timer = self.config.pool_timeout.and_then(|timeout| {
                    let pool = Arc::downgrade(self);
                    self.timer.schedule(timeout.duration, move || {
                        if let Some(pool) = pool.upgrade() {
                            pool.on_pool_timeout(seq, timeout.force);
                        }
                    })
                });
                *busy = Some(BusyPeriod {
                    since: Instant::now(),
                    seq,
                    timer,
                });
                true
            }
        };
        if started {
            debug!("pool busy");
            self.events.emit(PoolEvent::PoolStarted);
        }
    }

    fn busy_period(&self) -> Option<u64> {
        self.busy.lock().as_ref().map(|period| period.seq)
    }

    fn set_max_threads(self: &Arc<Self>, max: usize) -> Result<(), ConfigError> {
        let _resize = self.resize.lock();
        if max == 0 {
            return Err(ConfigError::ZeroMaxThreads);
        }
        let min = self.min_threads();
        if min > max {
            return Err(ConfigError::MinExceedsMax { min, max });
        }
        let previous = self.max_threads.swap(max, Ordering::AcqRel);
        debug!(previous, max, "max_threads changed");
        if max < previous {
            // idle workers go now, running ones after their current item
            for worker in self.workers() {
                if self.counts.shared() <= max {
                    break;
                }
                worker.try_retire_idle(self);
            }
        } else if max > previous {
            self.wake_for_backlog();
        }
        Ok(())
    }

    fn set_min_threads(self: &Arc<Self>, min: usize) -> Result<(), ConfigError> {
        let _resize = self.resize.lock();
        let max = self.max_threads();
        if min > max {
            return Err(ConfigError::MinExceedsMax { min, max });
        }
        let previous = self.min_threads.swap(min, Ordering::AcqRel);
        debug!(previous, min, "min_threads changed");
        if min > previous {
            self.ensure_min_workers();
        }
        Ok(())
    }

    /// Terminal shutdown. Only the first caller does the work.
    fn dispose(self: &Arc<Self>) {
        let Some(previous) = self.state.transition_any(
            &[PoolState::Suspended, PoolState::Running, PoolState::Stopping],
            PoolState::Disposed,
        ) else {
            return;
        };
        info!(pool_id = self.id, ?previous, "disposing pool");

        self.paused.store(false, Ordering::SeqCst);
        self.global.drain();
        for worker in self.workers() {
            worker.local.drain();
        }
        for item in self.snapshot_items() {
            match item.status() {
                WorkStatus::Waiting => {
                    self.cancel_waiting(&item, corral_api::WorkError::Disposed);
                }
                WorkStatus::Running | WorkStatus::Stopping => {
                    item.control.set_pool_pause(false);
                    item.control.resume();
                    item.control.request_stop();
                }
                _ => {}
            }
        }
        self.disposed.set();
        self.disposed_async.set();

        let workers = self.workers();
        for worker in &workers {
            worker.notify(Wake::Dispose);
        }
        if self.config.join_on_dispose {
            self.join_threads(&workers);
        }

        self.timer.shutdown();
        self.idle.set();
        self.idle_async.set();
        info!(pool_id = self.id, "pool disposed");
    }

    /// Join foreground threads, never the calling one.
    fn join_threads(&self, workers: &[Arc<Worker>]) {
        let current = thread::current().id();
        for worker in workers {
            if worker.is_running_background() {
                continue;
            }
            if let Some(handle) = worker.take_thread() {
                if handle.thread().id() != current && handle.join().is_err() {
                    warn!(worker_id = worker.id, "worker thread panicked");
                }
            }
        }
        let dedicated = std::mem::take(&mut *self.dedicated.lock());
        for thread in dedicated {
            if thread.background || thread.handle.thread().id() == current {
                continue;
            }
            if thread.handle.join().is_err() {
                warn!("dedicated thread panicked");
            }
        }
    }
}

/// Disposes the pool when the last [`Pool`] handle is dropped.
struct DisposeGuard {
    inner: Arc<PoolInner>,
}

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

/// Handle to a work pool.
///
/// Cloning is cheap and every clone controls the same pool. The pool is
/// disposed by [`dispose`](Self::dispose) or when the last handle is dropped.
///
/// # Examples
///
/// ```rust
/// use corral::{Pool, PoolConfig, WorkOptions};
///
/// let pool = Pool::new(PoolConfig::default().with_max_threads(2)).unwrap();
/// let id = pool.submit(|| Ok(21 * 2), WorkOptions::default()).unwrap();
/// assert!(pool.wait(&id));
///
/// let result = pool.fetch(&id, true).unwrap();
/// assert_eq!(result.value_as::<i32>(), Some(&42));
/// pool.dispose();
/// ```
#[derive(Clone)]
pub struct Pool {
    pub(crate) inner: Arc<PoolInner>,
    _guard: Arc<DisposeGuard>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state())
            .field("workers", &self.inner.counts.snapshot())
            .field("pending", &self.inner.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl Pool {
    /// Build a pool. It starts on the first submission unless
    /// `start_suspended` is set, in which case [`start`](Self::start) must be called.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let timer_name = format!("{}-timer", config.thread_name_prefix);
        let timer = Timer::start(timer_name.clone()).map_err(|source| PoolError::Spawn {
            name: timer_name,
            source,
        })?;

        let inner = Arc::new(PoolInner {
            id,
            max_threads: AtomicUsize::new(config.max_threads),
            min_threads: AtomicUsize::new(config.min_threads),
            resize: Mutex::new(()),
            state: AtomicState::new(PoolState::Suspended),
            items: DashMap::new(),
            results: DashMap::new(),
            global: collection::for_discipline(config.discipline),
            workers: RwLock::new(Vec::new()),
            counts: WorkerCounter::new(),
            dedicated: Mutex::new(Vec::new()),
            graph: DependencyGraph::default(),
            groups: GroupRegistry::default(),
            relations: GroupRelations::default(),
            events: EventBus::default(),
            timer,
            next_seq: AtomicU64::new(1),
            next_worker: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            busy: Mutex::new(None),
            next_period: AtomicU64::new(0),
            idle: ManualResetEvent::new(true),
            idle_async: AsyncManualResetEvent::new(true),
            disposed: ManualResetEvent::new(false),
            disposed_async: AsyncManualResetEvent::new(false),
            paused: AtomicBool::new(false),
            force_stop_all: AtomicBool::new(false),
            default_callback: RwLock::new(None),
            config,
        });
        debug!(
            pool_id = id,
            max_threads = inner.config.max_threads,
            min_threads = inner.config.min_threads,
            discipline = ?inner.config.discipline,
            "pool created"
        );
        Ok(Self {
            _guard: Arc::new(DisposeGuard {
                inner: Arc::clone(&inner),
            }),
            inner,
        })
    }

    /// Leave `Suspended`. Returns `false` if the pool was already started or disposed.
    pub fn start(&self) -> bool {
        self.inner.start()
    }

    /// Cancel waiting items, stop running ones and retire every worker.
    ///
    /// Idempotent. With `join_on_dispose`, blocks until foreground threads exit.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn state(&self) -> PoolState {
        self.inner.state()
    }

    /// No submitted item is still in flight.
    pub fn is_idle(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst) == 0
    }

    pub fn worker_counts(&self) -> WorkerCounts {
        self.inner.counts.snapshot()
    }

    /// Items sitting in the global and per-worker queues.
    pub fn queued_len(&self) -> usize {
        self.inner.global.len()
            + self
                .inner
                .workers()
                .iter()
                .map(|worker| worker.local.len())
                .sum::<usize>()
    }

    /// Submitted items that have not reached a terminal state.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Current status of a live item, or the recorded status of a retained result.
    pub fn status(&self, id: &WorkId) -> Option<WorkStatus> {
        if let Some(item) = self.inner.item(id) {
            return Some(item.status());
        }
        self.inner.results.get(id).map(|result| result.status)
    }

    pub fn running_ids(&self) -> Vec<WorkId> {
        self.ids_where(|status| status.is_executing())
    }

    pub fn waiting_ids(&self) -> Vec<WorkId> {
        self.ids_where(|status| status == WorkStatus::Waiting)
    }

    fn ids_where(&self, pred: impl Fn(WorkStatus) -> bool) -> Vec<WorkId> {
        self.inner
            .items
            .iter()
            .filter(|entry| pred(entry.value().status()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// The configuration in effect, including live thread bounds.
    pub fn config(&self) -> PoolConfig {
        let mut config = self.inner.config.clone();
        config.max_threads = self.inner.max_threads();
        config.min_threads = self.inner.min_threads();
        config
    }

    pub fn set_max_threads(&self, max: usize) -> Result<(), ConfigError> {
        self.inner.set_max_threads(max)
    }

    pub fn set_min_threads(&self, min: usize) -> Result<(), ConfigError> {
        self.inner.set_min_threads(min)
    }

    /// Register an event listener. Listeners run synchronously on the thread
    /// raising the event; an `Err` or panic is reported as `ErrorOccurred`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PoolEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on(kind, Arc::new(listener))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Callback run for every terminal outcome after the item's own callback.
    pub fn set_default_callback<F>(&self, callback: F)
    where
        F: Fn(&WorkResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.inner.default_callback.write() = Some(Arc::new(callback));
    }

    pub fn clear_default_callback(&self) {
        self.inner.default_callback.write().take();
    }

    /// Handle to the group called `name`. Groups exist implicitly.
    pub fn group(&self, name: &str) -> Group {
        Group::new(self.clone(), name)
    }

    /// Names of the groups `id` currently belongs to.
    pub fn groups_of(&self, id: &WorkId) -> Vec<String> {
        self.inner.groups.groups_of(id)
    }

    /// Drop every parent/child relation between groups.
    pub fn reset_group_relations(&self) {
        self.inner.relations.reset();
    }

    /// See [`control::pause_if_requested`](crate::control::pause_if_requested).
    pub fn pause_if_requested(&self) -> Result<(), ControlError> {
        checkpoint::pause_if_requested()
    }

    /// See [`control::stop_if_requested`](crate::control::stop_if_requested).
    pub fn stop_if_requested(&self) -> Result<(), ControlError> {
        checkpoint::stop_if_requested()
    }

    /// See [`control::check_if_requested_stop`](crate::control::check_if_requested_stop).
    pub fn check_if_requested_stop(&self) -> Result<bool, ControlError> {
        checkpoint::check_if_requested_stop()
    }

    /// See [`control::sleep`](crate::control::sleep).
    pub fn sleep(&self, duration: Duration) -> Result<(), ControlError> {
        checkpoint::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let error = Pool::new(PoolConfig::default().with_max_threads(0)).unwrap_err();
        assert!(matches!(error, PoolError::Config(ConfigError::ZeroMaxThreads)));
    }

    #[test]
    fn test_new_pool_is_suspended_and_idle() {
        let pool = Pool::new(PoolConfig::default().with_max_threads(2)).unwrap();
        assert_eq!(pool.state(), PoolState::Suspended);
        assert!(pool.is_idle());
        assert_eq!(pool.worker_counts().alive, 0);
        assert!(pool.start());
        assert!(!pool.start());
        pool.dispose();
        assert_eq!(pool.state(), PoolState::Disposed);
        assert!(!pool.start());
    }

    #[test]
    fn test_min_threads_spawned_on_start() {
        let pool = Pool::new(
            PoolConfig::default()
                .with_max_threads(4)
                .with_min_threads(2)
                .suspended(),
        )
        .unwrap();
        pool.start();
        assert_eq!(pool.worker_counts().alive, 2);
        pool.dispose();
    }

    #[test]
    fn test_resize_validation() {
        let pool = Pool::new(PoolConfig::default().with_max_threads(4).with_min_threads(1)).unwrap();
        assert_eq!(pool.set_max_threads(0), Err(ConfigError::ZeroMaxThreads));
        assert_eq!(
            pool.set_min_threads(5),
            Err(ConfigError::MinExceedsMax { min: 5, max: 4 })
        );
        pool.set_max_threads(8).unwrap();
        pool.set_min_threads(3).unwrap();
        assert_eq!(pool.config().max_threads, 8);
        assert_eq!(pool.config().min_threads, 3);
    }

    #[test]
    fn test_dropping_last_handle_disposes() {
        let pool = Pool::new(PoolConfig::default()).unwrap();
        let inner = Arc::clone(&pool.inner);
        let clone = pool.clone();
        drop(pool);
        assert_ne!(inner.state(), PoolState::Disposed);
        drop(clone);
        assert_eq!(inner.state(), PoolState::Disposed);
    }
}
