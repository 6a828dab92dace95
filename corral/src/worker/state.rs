//! Worker state fields and the pool-wide worker counter.
//!
//! A worker carries three closed enums, each in its own atomic byte:
//!
//! | field       | values                                         |
//! |-------------|------------------------------------------------|
//! | `lifecycle` | `Idle`, `Running`, `ToBeDisposed`, `Disposed`  |
//! | `gate`      | `Allowed`, `Forbidden`                         |
//! | `steal`     | `Allowed`, `NotAllowed`                        |
//!
//! The gate serializes lifecycle changes that must move the worker counter
//! in the same step. Whoever wins `Allowed → Forbidden` may change the
//! lifecycle and the counts, then reopens it. The worker thread waits for
//! the gate; the pool side gives up and tries another worker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::{AtomicEnum, AtomicState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Lifecycle {
    /// Parked on its wake channel.
    Idle = 0,
    /// Looking for or executing work.
    Running = 1,
    /// Retired; the thread is on its way out.
    ToBeDisposed = 2,
    Disposed = 3,
}

/// | from           | to                                  |
/// |----------------|-------------------------------------|
/// | `Idle`         | `Running`, `ToBeDisposed`, `Disposed` |
/// | `Running`      | `Idle`, `ToBeDisposed`, `Disposed`  |
/// | `ToBeDisposed` | `Disposed`                          |
/// | `Disposed`     | none                                |
impl AtomicEnum for Lifecycle {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Lifecycle::Idle,
            1 => Lifecycle::Running,
            2 => Lifecycle::ToBeDisposed,
            _ => Lifecycle::Disposed,
        }
    }

    fn allowed(from: Self, to: Self) -> bool {
        use Lifecycle::*;
        match from {
            Idle => matches!(to, Running | ToBeDisposed | Disposed),
            Running => matches!(to, Idle | ToBeDisposed | Disposed),
            ToBeDisposed => to == Disposed,
            Disposed => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Gate {
    Allowed = 0,
    Forbidden = 1,
}

impl AtomicEnum for Gate {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        if raw == 0 { Gate::Allowed } else { Gate::Forbidden }
    }

    fn allowed(from: Self, to: Self) -> bool {
        from != to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum StealFlag {
    Allowed = 0,
    NotAllowed = 1,
}

impl AtomicEnum for StealFlag {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        if raw == 0 { StealFlag::Allowed } else { StealFlag::NotAllowed }
    }

    fn allowed(from: Self, to: Self) -> bool {
        from != to
    }
}

#[derive(Debug)]
pub(crate) struct WorkerState {
    pub lifecycle: AtomicState<Lifecycle>,
    pub steal: AtomicState<StealFlag>,
    gate: AtomicState<Gate>,
}

impl WorkerState {
    /// A freshly spawned worker starts `Running`: it was counted as running
    /// when the pool reserved it.
    pub fn new() -> Self {
        Self {
            lifecycle: AtomicState::new(Lifecycle::Running),
            steal: AtomicState::new(StealFlag::Allowed),
            gate: AtomicState::new(Gate::Allowed),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.load()
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.lifecycle(), Lifecycle::ToBeDisposed | Lifecycle::Disposed)
    }

    pub fn steal_allowed(&self) -> bool {
        self.steal.load() == StealFlag::Allowed
    }

    /// Run `f` holding the gate, waiting for it if another thread has it.
    pub fn with_gate<R>(&self, f: impl FnOnce() -> R) -> R {
        while !self.gate.transition(Gate::Allowed, Gate::Forbidden) {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
        let result = f();
        self.gate.transition(Gate::Forbidden, Gate::Allowed);
        result
    }

    /// Run `f` holding the gate, or return `None` if it is closed.
    pub fn try_gate<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.gate.transition(Gate::Allowed, Gate::Forbidden) {
            return None;
        }
        let result = f();
        self.gate.transition(Gate::Forbidden, Gate::Allowed);
        Some(result)
    }
}

/// Snapshot of the pool's worker counts. `running + idle == alive` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerCounts {
    pub idle: usize,
    /// Shared workers executing or looking for work, plus dedicated long-running threads.
    pub running: usize,
    pub alive: usize,
}

/// Counts before and after one counter update.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CountChange {
    pub previous: WorkerCounts,
    pub current: WorkerCounts,
}

impl CountChange {
    /// `(previous, current)` running counts, if they differ.
    pub fn running_changed(&self) -> Option<(usize, usize)> {
        (self.previous.running != self.current.running)
            .then_some((self.previous.running, self.current.running))
    }
}

const FIELD_BITS: u32 = 21;
const FIELD_MASK: u64 = (1 << FIELD_BITS) - 1;
const IDLE_SHIFT: u32 = FIELD_BITS;
const DEDICATED_SHIFT: u32 = FIELD_BITS * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Packed {
    shared_running: u64,
    idle: u64,
    dedicated: u64,
}

impl Packed {
    fn unpack(raw: u64) -> Self {
        Self {
            shared_running: raw & FIELD_MASK,
            idle: (raw >> IDLE_SHIFT) & FIELD_MASK,
            dedicated: (raw >> DEDICATED_SHIFT) & FIELD_MASK,
        }
    }

    fn pack(self) -> u64 {
        (self.shared_running & FIELD_MASK)
            | ((self.idle & FIELD_MASK) << IDLE_SHIFT)
            | ((self.dedicated & FIELD_MASK) << DEDICATED_SHIFT)
    }

    /// Shared workers, the ones bounded by `min_threads..=max_threads`.
    fn shared(self) -> usize {
        (self.shared_running + self.idle) as usize
    }

    fn counts(self) -> WorkerCounts {
        let running = (self.shared_running + self.dedicated) as usize;
        let idle = self.idle as usize;
        WorkerCounts {
            idle,
            running,
            alive: running + idle,
        }
    }
}

/// Running, idle and dedicated worker counts packed into one `u64`
/// (21 bits each), so every update moves all of them atomically.
pub(crate) struct WorkerCounter {
    raw: AtomicU64,
}

impl fmt::Debug for WorkerCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

impl WorkerCounter {
    pub fn new() -> Self {
        Self { raw: AtomicU64::new(0) }
    }

    pub fn snapshot(&self) -> WorkerCounts {
        Packed::unpack(self.raw.load(Ordering::Acquire)).counts()
    }

    /// Number of shared workers (idle or running, dedicated excluded).
    pub fn shared(&self) -> usize {
        Packed::unpack(self.raw.load(Ordering::Acquire)).shared()
    }

    fn update(&self, f: impl Fn(Packed) -> Option<Packed>) -> Option<CountChange> {
        let mut raw = self.raw.load(Ordering::Acquire);
        loop {
            let previous = Packed::unpack(raw);
            let next = f(previous)?;
            match self
                .raw
                .compare_exchange_weak(raw, next.pack(), Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    return Some(CountChange {
                        previous: previous.counts(),
                        current: next.counts(),
                    });
                }
                Err(actual) => raw = actual,
            }
        }
    }

    /// Count a new shared worker as running, if the pool is below `max`.
    pub fn reserve_running(&self, max: usize) -> Option<CountChange> {
        self.update(|c| {
            (c.shared() < max).then(|| Packed {
                shared_running: c.shared_running + 1,
                ..c
            })
        })
    }

    pub fn to_running(&self) -> Option<CountChange> {
        self.update(|c| {
            (c.idle > 0).then(|| Packed {
                shared_running: c.shared_running + 1,
                idle: c.idle - 1,
                ..c
            })
        })
    }

    pub fn to_idle(&self) -> Option<CountChange> {
        self.update(|c| {
            (c.shared_running > 0).then(|| Packed {
                shared_running: c.shared_running - 1,
                idle: c.idle + 1,
                ..c
            })
        })
    }

    /// Drop one idle worker, keeping at least `min` shared workers.
    pub fn try_retire_idle(&self, min: usize) -> Option<CountChange> {
        self.update(|c| {
            (c.idle > 0 && c.shared() > min).then(|| Packed {
                idle: c.idle - 1,
                ..c
            })
        })
    }

    /// Drop one running worker while the pool is above `max`.
    pub fn try_retire_running(&self, max: usize) -> Option<CountChange> {
        self.update(|c| {
            (c.shared_running > 0 && c.shared() > max).then(|| Packed {
                shared_running: c.shared_running - 1,
                ..c
            })
        })
    }

    pub fn release_running(&self) -> Option<CountChange> {
        self.update(|c| {
            (c.shared_running > 0).then(|| Packed {
                shared_running: c.shared_running - 1,
                ..c
            })
        })
    }

    pub fn release_idle(&self) -> Option<CountChange> {
        self.update(|c| (c.idle > 0).then(|| Packed { idle: c.idle - 1, ..c }))
    }

    pub fn reserve_dedicated(&self) -> Option<CountChange> {
        self.update(|c| {
            (c.dedicated < FIELD_MASK).then(|| Packed {
                dedicated: c.dedicated + 1,
                ..c
            })
        })
    }

    pub fn release_dedicated(&self) -> Option<CountChange> {
        self.update(|c| {
            (c.dedicated > 0).then(|| Packed {
                dedicated: c.dedicated - 1,
                ..c
            })
        })
    }
}
