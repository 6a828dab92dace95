//! Closed state enums stored in an atomic byte.
//!
//! Each enum lists its legal transitions in [`AtomicEnum::allowed`]. A
//! transition that is not in the table, or whose expected current value is
//! stale, is refused by returning `false`; races between threads are expected
//! and never panic.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

use corral_api::{PoolState, WorkStatus};

pub(crate) trait AtomicEnum: Copy + Eq + fmt::Debug {
    fn to_raw(self) -> u8;
    fn from_raw(raw: u8) -> Self;
    fn allowed(from: Self, to: Self) -> bool;
}

pub(crate) struct AtomicState<S> {
    raw: AtomicU8,
    _marker: PhantomData<S>,
}

impl<S: AtomicEnum> AtomicState<S> {
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.to_raw()),
            _marker: PhantomData,
        }
    }

    pub fn load(&self) -> S {
        S::from_raw(self.raw.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` if the table allows it and the current value is `from`.
    pub fn transition(&self, from: S, to: S) -> bool {
        if !S::allowed(from, to) {
            return false;
        }
        self.raw
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Try each source state in turn; returns the one that was replaced.
    pub fn transition_any(&self, from: &[S], to: S) -> Option<S> {
        loop {
            let current = self.load();
            if !from.contains(&current) || !S::allowed(current, to) {
                return None;
            }
            if self.transition(current, to) {
                return Some(current);
            }
        }
    }
}

impl<S: AtomicEnum> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}

/// | from       | to                                              |
/// |------------|-------------------------------------------------|
/// | `Waiting`  | `Running`, `Canceled`, `Failed` (dependency)     |
/// | `Running`  | `Stopping`, any terminal except `Canceled`       |
/// | `Stopping` | any terminal except `Canceled`                   |
/// | `Failed`   | `Waiting` (requeue retry)                        |
impl AtomicEnum for WorkStatus {
    fn to_raw(self) -> u8 {
        self.as_u8()
    }

    fn from_raw(raw: u8) -> Self {
        WorkStatus::from_u8(raw).unwrap_or(WorkStatus::Failed)
    }

    fn allowed(from: Self, to: Self) -> bool {
        use WorkStatus::*;
        match from {
            Waiting => matches!(to, Running | Canceled | Failed),
            Running => matches!(to, Stopping | Stopped | Succeed | Failed | ForceStopped),
            Stopping => matches!(to, Stopped | Succeed | Failed | ForceStopped),
            Failed => to == Waiting,
            Stopped | Canceled | Succeed | ForceStopped => false,
        }
    }
}

/// | from        | to                              |
/// |-------------|---------------------------------|
/// | `Suspended` | `Running`, `Disposed`           |
/// | `Running`   | `Stopping`, `Disposed`          |
/// | `Stopping`  | `Running`, `Disposed`           |
/// | `Disposed`  | none                            |
impl AtomicEnum for PoolState {
    fn to_raw(self) -> u8 {
        self.as_u8()
    }

    fn from_raw(raw: u8) -> Self {
        PoolState::from_u8(raw).unwrap_or(PoolState::Disposed)
    }

    fn allowed(from: Self, to: Self) -> bool {
        use PoolState::*;
        match from {
            Suspended => matches!(to, Running | Disposed),
            Running => matches!(to, Stopping | Disposed),
            Stopping => matches!(to, Running | Disposed),
            Disposed => false,
        }
    }
}
