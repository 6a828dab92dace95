//! # Signals
//!
//! Broadcast-style events used for completion and cancellation.
//!
//! Both reset events start unset. `set()` releases every current waiter and
//! every future waiter until `reset()`. [`AsyncManualResetEvent`] keeps one
//! *generation* object per set/reset cycle: `reset()` after `set()` installs a
//! fresh generation, so waiters that already captured the old (set)
//! generation still complete while new waiters block on the new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// Blocking manual-reset event.
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl ManualResetEvent {
    pub fn new(initially_set: bool) -> Self {
        Self {
            flag: Mutex::new(initially_set),
            cv: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cv.notify_all();
    }

    pub fn reset(&self) {
        *self.flag.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.cv.wait(&mut flag);
        }
    }

    /// Returns whether the event was set before the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut flag = self.flag.lock();
        while !*flag {
            if self.cv.wait_until(&mut flag, deadline).timed_out() {
                return *flag;
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct Generation {
    set: AtomicBool,
    notify: Notify,
}

/// Future-returning manual-reset event.
#[derive(Debug)]
pub struct AsyncManualResetEvent {
    current: Mutex<Arc<Generation>>,
}

impl Default for AsyncManualResetEvent {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AsyncManualResetEvent {
    pub fn new(initially_set: bool) -> Self {
        let generation = Generation::default();
        generation.set.store(initially_set, Ordering::SeqCst);
        Self {
            current: Mutex::new(Arc::new(generation)),
        }
    }

    pub fn set(&self) {
        let generation = Arc::clone(&self.current.lock());
        generation.set.store(true, Ordering::SeqCst);
        generation.notify.notify_waiters();
    }

    /// Install a fresh generation if the current one is set; otherwise a no-op.
    pub fn reset(&self) {
        let mut current = self.current.lock();
        if current.set.load(Ordering::SeqCst) {
            *current = Arc::new(Generation::default());
        }
    }

    pub fn is_set(&self) -> bool {
        self.current.lock().set.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        let generation = Arc::clone(&self.current.lock());
        if generation.set.load(Ordering::SeqCst) {
            return;
        }
        let notified = generation.notify.notified();
        tokio::pin!(notified);
        // register before the re-check so a concurrent set cannot slip between them
        notified.as_mut().enable();
        if generation.set.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    blocking: ManualResetEvent,
    nonblocking: AsyncManualResetEvent,
}

/// Caller-owned signal that ends a wait early with `WaitError::Canceled`.
///
/// Cloning shares the signal. Canceling never changes pool state.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.blocking.set();
        self.inner.nonblocking.set();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.blocking.is_set()
    }

    /// Block until canceled or until the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.blocking.wait_timeout(timeout)
    }

    /// Resolves once the signal is canceled.
    pub async fn canceled(&self) {
        self.inner.nonblocking.wait().await
    }
}
