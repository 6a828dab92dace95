//! # Worker Threads
//!
//! Shared workers are OS threads owned by one pool. Each keeps a local
//! stealable queue and loops between two phases:
//!
//! ## Busy phase
//! 1. Take the next item from the local queue
//! 2. Otherwise steal from a peer whose steal flag is `Allowed`
//! 3. Otherwise take from the pool's global queue
//! 4. Execute it, then retire if the pool now has more workers than `max_threads`
//!
//! Workers only take work while the pool is `Running`; a suspended or
//! draining pool leaves queued items where they are.
//!
//! ## Idle phase
//! The worker re-checks every queue before it blocks on its wake channel,
//! and a submitter publishes the item before it looks for an idle worker to
//! wake, so an item is never left behind with every worker asleep. An idle
//! worker above `min_threads` retires after `keep_alive` without work.
//!
//! Items flagged long-running skip all of this and get a thread of their own
//! (see [`spawn_dedicated`]).

mod dedicated;
mod state;

pub(crate) use dedicated::{DedicatedThread, spawn_dedicated};
pub(crate) use state::{CountChange, WorkerCounter};
pub use state::WorkerCounts;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use corral_api::PoolState;
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::collection::{self, StealableCollection};
use crate::config::StealPolicy;
use crate::pool::PoolInner;
use crate::work::{WorkItem, panic_message};
use state::{Lifecycle, StealFlag, WorkerState};

/// Signals delivered over a worker's wake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// New work may be available.
    Work,
    /// Leave the idle loop and exit.
    Dispose,
}

/// Where the loop goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Busy,
    Idle,
    Exit,
}

thread_local! {
    static CURRENT_WORKER: RefCell<Option<Arc<Worker>>> = const { RefCell::new(None) };
}

/// The worker running on this thread, if it belongs to pool `pool_id`.
pub(crate) fn current(pool_id: u64) -> Option<Arc<Worker>> {
    CURRENT_WORKER.with(|current| {
        current
            .borrow()
            .as_ref()
            .filter(|worker| worker.pool_id == pool_id)
            .cloned()
    })
}

pub(crate) struct Worker {
    /// Unique within the pool
    pub id: usize,

    /// Identity of the owning pool, to recognize our own threads
    pool_id: u64,

    pub state: WorkerState,

    /// Items placed on this worker; peers may steal from it
    pub local: Box<dyn StealableCollection<Arc<WorkItem>>>,

    wake_tx: Sender<Wake>,

    /// Handed to the thread when it starts
    wake_rx: Mutex<Option<Receiver<Wake>>>,

    /// Set while executing an item submitted as background
    running_background: AtomicBool,

    thread: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("lifecycle", &self.state.lifecycle())
            .field("queued", &self.local.len())
            .finish()
    }
}

impl Worker {
    /// A worker with an empty local queue. Nothing runs until [`start`](Self::start).
    pub fn new(pool: &PoolInner, id: usize) -> Arc<Worker> {
        let (wake_tx, wake_rx) = flume::unbounded();
        Arc::new(Worker {
            id,
            pool_id: pool.id,
            state: WorkerState::new(),
            local: collection::for_discipline(pool.config.discipline),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
            running_background: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    /// Start the worker thread. The caller has already counted the worker
    /// as running and registered it with the pool.
    pub fn start(self: &Arc<Self>, pool: &Arc<PoolInner>) -> io::Result<()> {
        let Some(wake_rx) = self.wake_rx.lock().take() else {
            return Ok(());
        };
        let mut builder = thread::Builder::new().name(format!("{}-{}", pool.config.thread_name_prefix, self.id));
        if let Some(size) = pool.config.thread_stack_size {
            builder = builder.stack_size(size);
        }
        let handle = {
            let worker = Arc::clone(self);
            let pool = Arc::clone(pool);
            builder.spawn(move || worker.main(pool, wake_rx))?
        };
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    pub fn notify(&self, wake: Wake) {
        // the receiver only goes away with the thread, after which nobody needs waking
        let _ = self.wake_tx.send(wake);
    }

    pub fn is_idle(&self) -> bool {
        self.state.lifecycle() == Lifecycle::Idle
    }

    pub fn is_running_background(&self) -> bool {
        self.running_background.load(Ordering::Acquire)
    }

    pub fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }

    /// Pool-side handoff: wake an idle worker with `item` in its local queue.
    ///
    /// Fails without side effects if the worker is not idle or its gate is
    /// held by someone else.
    pub fn try_hand_off(&self, pool: &PoolInner, item: &Arc<WorkItem>) -> bool {
        let accepted = self
            .state
            .try_gate(|| {
                if !self.state.lifecycle.transition(Lifecycle::Idle, Lifecycle::Running) {
                    return None;
                }
                let change = pool.counts.to_running();
                self.local.set(Arc::clone(item), item.priority);
                Some(change)
            })
            .flatten();
        match accepted {
            Some(change) => {
                pool.count_changed(change);
                self.notify(Wake::Work);
                true
            }
            None => false,
        }
    }

    /// Pool-side retirement of an idle worker, used when shrinking.
    pub fn try_retire_idle(&self, pool: &PoolInner) -> bool {
        match self.state.try_gate(|| self.retire_idle(pool)).flatten() {
            Some(change) => {
                pool.count_changed(Some(change));
                self.notify(Wake::Dispose);
                true
            }
            None => false,
        }
    }

    /// Idle → ToBeDisposed if the pool can spare a worker. Call with the gate held.
    fn retire_idle(&self, pool: &PoolInner) -> Option<CountChange> {
        if self.state.lifecycle() != Lifecycle::Idle {
            return None;
        }
        let change = pool.counts.try_retire_idle(pool.min_threads())?;
        self.state.lifecycle.transition(Lifecycle::Idle, Lifecycle::ToBeDisposed);
        Some(change)
    }

    fn main(self: Arc<Self>, pool: Arc<PoolInner>, wake_rx: Receiver<Wake>) {
        CURRENT_WORKER.with(|current| *current.borrow_mut() = Some(Arc::clone(&self)));
        let span = crate::worker_span!(pool.id, self.id);
        let _entered = span.enter();
        debug!("worker started");

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.run(&pool, &wake_rx))) {
            error!(panic = %panic_message(payload.as_ref()), "worker loop panicked");
        }

        self.exit(&pool);
        CURRENT_WORKER.with(|current| current.borrow_mut().take());
    }

    fn run(&self, pool: &Arc<PoolInner>, wake_rx: &Receiver<Wake>) {
        let mut step = Step::Busy;
        loop {
            step = match step {
                Step::Busy => self.run_busy(pool),
                Step::Idle => self.run_idle(pool, wake_rx),
                Step::Exit => return,
            };
        }
    }

    fn run_busy(&self, pool: &Arc<PoolInner>) -> Step {
        loop {
            match pool.state() {
                PoolState::Disposed => return Step::Exit,
                PoolState::Running => {}
                PoolState::Suspended | PoolState::Stopping => return Step::Idle,
            }
            let Some(item) = self.acquire(pool) else {
                return Step::Idle;
            };

            self.running_background.store(item.background, Ordering::Release);
            pool.execute(item);
            self.running_background.store(false, Ordering::Release);

            if self.try_retire_running(pool) {
                debug!("worker retired above max_threads");
                return Step::Exit;
            }
        }
    }

    fn run_idle(&self, pool: &Arc<PoolInner>, wake_rx: &Receiver<Wake>) -> Step {
        let change = self.state.with_gate(|| {
            if self.state.lifecycle.transition(Lifecycle::Running, Lifecycle::Idle) {
                pool.counts.to_idle()
            } else {
                None
            }
        });
        pool.count_changed(change);
        // pairs with the fence a submitter issues between queueing and looking for idle workers
        atomic::fence(Ordering::SeqCst);

        loop {
            if pool.state() == PoolState::Disposed {
                return Step::Exit;
            }
            match self.state.lifecycle() {
                Lifecycle::Running => return Step::Busy,
                Lifecycle::ToBeDisposed | Lifecycle::Disposed => return Step::Exit,
                Lifecycle::Idle => {}
            }
            if pool.state() == PoolState::Running && self.has_work(pool) {
                if self.wake_self(pool) {
                    return Step::Busy;
                }
                continue;
            }

            match wake_rx.recv_timeout(pool.config.keep_alive) {
                Ok(Wake::Work) => continue,
                Ok(Wake::Dispose) | Err(RecvTimeoutError::Disconnected) => return Step::Exit,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(change) = self.state.with_gate(|| self.retire_idle(pool)) {
                        pool.count_changed(Some(change));
                        debug!("idle worker retired after keep-alive");
                        return Step::Exit;
                    }
                }
            }
        }
    }

    /// Idle → Running on our own initiative. `true` also when a handoff got there first.
    fn wake_self(&self, pool: &PoolInner) -> bool {
        let (awake, change) = self.state.with_gate(|| match self.state.lifecycle() {
            Lifecycle::Idle if self.state.lifecycle.transition(Lifecycle::Idle, Lifecycle::Running) => {
                (true, pool.counts.to_running())
            }
            Lifecycle::Running => (true, None),
            _ => (false, None),
        });
        pool.count_changed(change);
        awake
    }

    fn try_retire_running(&self, pool: &PoolInner) -> bool {
        let max = pool.max_threads();
        if pool.counts.shared() <= max {
            return false;
        }
        let retired = self.state.with_gate(|| {
            if self.state.lifecycle() != Lifecycle::Running {
                return None;
            }
            let change = pool.counts.try_retire_running(max)?;
            self.state.lifecycle.transition(Lifecycle::Running, Lifecycle::ToBeDisposed);
            Some(change)
        });
        match retired {
            Some(change) => {
                pool.count_changed(Some(change));
                true
            }
            None => false,
        }
    }

    fn has_work(&self, pool: &PoolInner) -> bool {
        if !self.local.is_empty() || !pool.global.is_empty() {
            return true;
        }
        pool.workers()
            .iter()
            .any(|peer| self.can_steal_from(peer) && !peer.local.is_empty())
    }

    fn can_steal_from(&self, peer: &Worker) -> bool {
        peer.id != self.id && peer.state.steal_allowed() && !peer.state.is_disposed()
    }

    fn acquire(&self, pool: &PoolInner) -> Option<Arc<WorkItem>> {
        self.local
            .get()
            .or_else(|| self.steal(pool))
            .or_else(|| pool.global.get())
    }

    fn steal(&self, pool: &PoolInner) -> Option<Arc<WorkItem>> {
        for peer in pool.workers() {
            if !self.can_steal_from(&peer) || peer.local.is_empty() {
                continue;
            }
            let stolen = match pool.config.steal_policy {
                StealPolicy::One => peer.local.steal(),
                StealPolicy::Half => self.steal_half(&peer),
            };
            if let Some(item) = stolen {
                trace!(victim = peer.id, work_id = %item.id, "stole work");
                return Some(item);
            }
        }
        None
    }

    /// Take half of the peer's backlog: keep the first, queue the rest locally.
    fn steal_half(&self, peer: &Worker) -> Option<Arc<WorkItem>> {
        // one thief at a time per victim
        if !peer.state.steal.transition(StealFlag::Allowed, StealFlag::NotAllowed) {
            return None;
        }
        let batch = peer.local.steal_batch((peer.local.len() / 2).max(1));
        peer.state.steal.transition(StealFlag::NotAllowed, StealFlag::Allowed);

        let mut batch = batch.into_iter();
        let first = batch.next();
        for item in batch {
            let priority = item.priority;
            self.local.set(item, priority);
        }
        first
    }

    fn exit(&self, pool: &Arc<PoolInner>) {
        let previous = self.state.with_gate(|| {
            self.state.lifecycle.transition_any(
                &[Lifecycle::Idle, Lifecycle::Running, Lifecycle::ToBeDisposed],
                Lifecycle::Disposed,
            )
        });
        let change = match previous {
            Some(Lifecycle::Idle) => pool.counts.release_idle(),
            Some(Lifecycle::Running) => pool.counts.release_running(),
            // already uncounted by whoever retired us
            Some(Lifecycle::ToBeDisposed) | Some(Lifecycle::Disposed) | None => None,
        };
        pool.count_changed(change);
        pool.remove_worker(self.id);

        let stranded = self.local.drain();
        if !stranded.is_empty() {
            trace!(count = stranded.len(), "returning local items to the global queue");
            for item in stranded {
                let priority = item.priority;
                pool.global.set(item, priority);
            }
        }
        if !pool.global.is_empty() {
            pool.wake_idle();
        }
        debug!("worker stopped");
    }
}
