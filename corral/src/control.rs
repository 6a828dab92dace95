//! # Cooperative Control Plane
//!
//! Checkpoints a work callback calls to honor pause and stop requests, and
//! the per-item flags that external threads set to request them.
//!
//! ## Key Concepts
//! - **Pause**: blocks the item at its next checkpoint until resumed. An item
//!   can be paused on its own (`paused_by_id`) and by a pool-wide pause
//!   (`paused_by_pool`); it runs again only when both are cleared.
//! - **Cooperative stop**: a flag the callback observes through
//!   [`stop_if_requested`] and answers by returning `Err(ControlError::Stopped)`.
//! - **Forced stop**: abandons the callback at its next interruption point.
//!   Every checkpoint, [`sleep`] included, returns
//!   `Err(ControlError::ForceStopped)` once it is set, and a paused or sleeping
//!   callback is woken immediately.
//!
//! Checkpoints are only meaningful on a thread that is executing a work item
//! (a pool worker, a caller running an item inline, or a waiter that helps).
//! Anywhere else they return `Err(ControlError::NotOnWorkerThread)`.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::time::Duration;
//! use corral::{control, Pool, PoolConfig, WorkOptions};
//!
//! let pool = Pool::new(PoolConfig::default()).unwrap();
//! let id = pool
//!     .submit(
//!         || {
//!             for _ in 0..3 {
//!                 control::stop_if_requested()?;
//!                 control::sleep(Duration::from_millis(5))?;
//!             }
//!             Ok("done")
//!         },
//!         WorkOptions::default(),
//!     )
//!     .unwrap();
//! assert!(pool.wait(&id));
//!
//! // not on a work thread
//! assert!(control::stop_if_requested().is_err());
//! ```

use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corral_api::ControlError;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    paused_by_id: bool,
    paused_by_pool: bool,
    stop: bool,
    force: bool,
}

impl Flags {
    fn paused(&self) -> bool {
        self.paused_by_id || self.paused_by_pool
    }
}

/// Pause/stop/force flags of one work item, shared between the executing
/// thread and controllers.
#[derive(Debug, Default)]
pub(crate) struct ItemControl {
    flags: Mutex<Flags>,
    cv: Condvar,
}

impl ItemControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the item was not already paused individually.
    pub fn pause(&self) -> bool {
        let mut flags = self.flags.lock();
        let first = !std::mem::replace(&mut flags.paused_by_id, true);
        // sleepers re-evaluate their remaining time
        self.cv.notify_all();
        first
    }

    /// Returns `true` only if an individual pause was lifted.
    pub fn resume(&self) -> bool {
        let mut flags = self.flags.lock();
        let was_paused = std::mem::replace(&mut flags.paused_by_id, false);
        if was_paused {
            self.cv.notify_all();
        }
        was_paused
    }

    pub fn set_pool_pause(&self, paused: bool) -> bool {
        let mut flags = self.flags.lock();
        let changed = flags.paused_by_pool != paused;
        flags.paused_by_pool = paused;
        if changed {
            self.cv.notify_all();
        }
        changed
    }

    /// Returns `true` for the first caller only.
    pub fn request_stop(&self) -> bool {
        let mut flags = self.flags.lock();
        let first = !std::mem::replace(&mut flags.stop, true);
        self.cv.notify_all();
        first
    }

    /// Returns `true` for the first caller only.
    pub fn request_force(&self) -> bool {
        let mut flags = self.flags.lock();
        let first = !std::mem::replace(&mut flags.force, true);
        self.cv.notify_all();
        first
    }

    pub fn is_paused(&self) -> bool {
        self.flags.lock().paused()
    }

    pub fn is_paused_individually(&self) -> bool {
        self.flags.lock().paused_by_id
    }

    pub fn stop_requested(&self) -> bool {
        let flags = self.flags.lock();
        flags.stop || flags.force
    }

    pub fn force_requested(&self) -> bool {
        self.flags.lock().force
    }

    /// Block while paused. Fails only when a forced stop is pending.
    pub fn wait_while_paused(&self) -> Result<(), ControlError> {
        let mut flags = self.flags.lock();
        loop {
            if flags.force {
                return Err(ControlError::ForceStopped);
            }
            if !flags.paused() {
                return Ok(());
            }
            self.cv.wait(&mut flags);
        }
    }

    /// Sleep for `duration` of unpaused time.
    ///
    /// Time spent paused does not count; a stop or forced stop ends the sleep early.
    pub fn sleep(&self, duration: Duration) -> Result<(), ControlError> {
        let mut remaining = duration;
        let mut flags = self.flags.lock();
        loop {
            if flags.force {
                return Err(ControlError::ForceStopped);
            }
            if flags.stop {
                return Err(ControlError::Stopped);
            }
            if flags.paused() {
                self.cv.wait(&mut flags);
                continue;
            }
            if remaining.is_zero() {
                return Ok(());
            }
            let started = Instant::now();
            let _ = self.cv.wait_for(&mut flags, remaining);
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ItemControl>>> = const { RefCell::new(None) };
}

/// Marks the current thread as executing an item until dropped.
pub(crate) struct ExecutionScope {
    previous: Option<Arc<ItemControl>>,
}

impl ExecutionScope {
    pub fn enter(control: &Arc<ItemControl>) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(Arc::clone(control))));
        Self { previous }
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

fn with_current<R>(f: impl FnOnce(&ItemControl) -> Result<R, ControlError>) -> Result<R, ControlError> {
    let control = CURRENT.with(|current| current.borrow().clone());
    match control {
        Some(control) => f(&control),
        None => Err(ControlError::NotOnWorkerThread),
    }
}

/// Whether the calling thread is executing a work item.
pub fn is_work_thread() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// Block while the current item is paused.
pub fn pause_if_requested() -> Result<(), ControlError> {
    with_current(|control| control.wait_while_paused())
}

/// Honor a pending pause, then fail with `Stopped` / `ForceStopped` if a stop was requested.
pub fn stop_if_requested() -> Result<(), ControlError> {
    with_current(|control| {
        control.wait_while_paused()?;
        if control.force_requested() {
            Err(ControlError::ForceStopped)
        } else if control.stop_requested() {
            Err(ControlError::Stopped)
        } else {
            Ok(())
        }
    })
}

/// Non-blocking query: has a stop (cooperative or forced) been requested?
pub fn check_if_requested_stop() -> Result<bool, ControlError> {
    with_current(|control| Ok(control.stop_requested()))
}

/// Interruptible sleep for `duration` of unpaused time.
///
/// Returns early with `Stopped` or `ForceStopped` when a stop is requested.
pub fn sleep(duration: Duration) -> Result<(), ControlError> {
    with_current(|control| control.sleep(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_checkpoints_fail_off_work_thread() {
        assert_eq!(pause_if_requested(), Err(ControlError::NotOnWorkerThread));
        assert_eq!(stop_if_requested(), Err(ControlError::NotOnWorkerThread));
        assert_eq!(check_if_requested_stop(), Err(ControlError::NotOnWorkerThread));
        assert_eq!(sleep(Duration::ZERO), Err(ControlError::NotOnWorkerThread));
        assert!(!is_work_thread());
    }

    #[test]
    fn test_scope_restores_previous_control() {
        let outer = Arc::new(ItemControl::new());
        let inner = Arc::new(ItemControl::new());
        let _outer_scope = ExecutionScope::enter(&outer);
        {
            let _inner_scope = ExecutionScope::enter(&inner);
            inner.request_stop();
            assert_eq!(stop_if_requested(), Err(ControlError::Stopped));
        }
        assert_eq!(stop_if_requested(), Ok(()));
    }

    #[test]
    fn test_resume_without_pause_is_noop() {
        let control = ItemControl::new();
        assert!(!control.resume());
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.resume());
    }

    #[test]
    fn test_force_is_attributed_once() {
        let control = Arc::new(ItemControl::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let control = Arc::clone(&control);
                thread::spawn(move || control.request_force())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_force_wakes_paused_checkpoint() {
        let control = Arc::new(ItemControl::new());
        control.pause();
        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(20));
        control.request_force();
        assert_eq!(waiter.join().unwrap(), Err(ControlError::ForceStopped));
    }

    #[test]
    fn test_sleep_excludes_paused_time() {
        let control = Arc::new(ItemControl::new());
        let sleeper = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                let started = Instant::now();
                control.sleep(Duration::from_millis(100)).map(|_| started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        control.pause();
        thread::sleep(Duration::from_millis(150));
        control.resume();
        let elapsed = sleeper.join().unwrap().unwrap();
        assert!(elapsed >= Duration::from_millis(240), "slept {elapsed:?}");
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let control = Arc::new(ItemControl::new());
        let sleeper = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.sleep(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        control.request_stop();
        assert_eq!(sleeper.join().unwrap(), Err(ControlError::Stopped));
    }
}
