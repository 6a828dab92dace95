//! # Timer Thread
//!
//! One background thread per pool that fires deadline callbacks. Deadlines
//! live in a min-heap; callbacks live in a map keyed by timer id, so
//! cancelling a timer only removes its callback and the stale heap entry is
//! skipped when it comes due.
//!
//! Callbacks run on the timer thread, one at a time, outside the lock. A
//! callback that panics is logged and the thread keeps going.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use crate::work::panic_message;

type TimerCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TimerState {
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    callbacks: HashMap<u64, TimerCallback>,
    next_id: u64,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    cv: Condvar,
}

/// Handle to a scheduled callback. Dropping it does not cancel the timer.
#[derive(Debug, Clone)]
pub(crate) struct TimerHandle {
    id: u64,
    shared: Weak<TimerShared>,
}

impl TimerHandle {
    /// Returns `true` if the callback had not fired yet.
    pub fn cancel(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.state.lock().callbacks.remove(&self.id).is_some(),
            None => false,
        }
    }
}

pub(crate) struct Timer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn start(name: String) -> io::Result<Self> {
        let shared = Arc::new(TimerShared::default());
        let thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(name)
                .spawn(move || Self::run(shared))?
        };
        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Run `callback` after `delay`. `None` if the deadline is beyond what
    /// `Instant` can represent; such a timer would never fire.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> Option<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now().checked_add(delay)?;
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        if !state.shutdown {
            state.callbacks.insert(id, Box::new(callback));
            state.deadlines.push(Reverse((deadline, id)));
            self.shared.cv.notify_one();
        }
        Some(TimerHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Drop pending callbacks and stop the thread. Joins unless called from the timer thread.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.callbacks.clear();
            state.deadlines.clear();
            self.shared.cv.notify_all();
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn run(shared: Arc<TimerShared>) {
        debug!("timer thread started");
        let mut state = shared.state.lock();
        while !state.shutdown {
            let now = Instant::now();
            match state.deadlines.peek().copied() {
                Some(Reverse((deadline, id))) if deadline <= now => {
                    state.deadlines.pop();
                    // cancelled timers have no callback left
                    let Some(callback) = state.callbacks.remove(&id) else {
                        continue;
                    };
                    drop(state);
                    trace!(timer_id = id, "timer fired");
                    if let Err(e) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                        error!(timer_id = id, panic = %panic_message(e.as_ref()), "timer callback panicked");
                    }
                    state = shared.state.lock();
                }
                Some(Reverse((deadline, _))) => {
                    shared.cv.wait_until(&mut state, deadline);
                }
                None => shared.cv.wait(&mut state),
            }
        }
        debug!("timer thread stopped");
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callbacks_fire_in_deadline_order() {
        let timer = Timer::start("timer-test".into()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (delay, tag) in [(60u64, 3), (20, 1), (40, 2)] {
            let order = Arc::clone(&order);
            timer.schedule(Duration::from_millis(delay), move || order.lock().push(tag));
        }
        thread::sleep(Duration::from_millis(200));
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let timer = Timer::start("timer-test".into()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = {
            let fired = Arc::clone(&fired);
            timer.schedule(Duration::from_millis(30), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        }
        .unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_callback_keeps_thread_alive() {
        let timer = Timer::start("timer-test".into()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        timer.schedule(Duration::from_millis(5), || panic!("boom"));
        {
            let fired = Arc::clone(&fired);
            timer.schedule(Duration::from_millis(20), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        timer.shutdown();
    }

    #[test]
    fn test_unrepresentable_deadline_is_not_scheduled() {
        let timer = Timer::start("timer-test".into()).unwrap();
        assert!(timer.schedule(Duration::MAX, || ()).is_none());
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            timer.schedule(Duration::from_millis(5), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
