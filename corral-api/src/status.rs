//! Status enums observed by callers.
//!
//! Both enums are `#[repr(u8)]` so the runtime can keep them in an atomic
//! byte and drive them with compare-and-exchange.

/// Status of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkStatus {
    /// Queued, or held back by unmet dependencies.
    Waiting = 0,
    /// Claimed by a worker and executing.
    Running = 1,
    /// Running with a cooperative stop request pending.
    Stopping = 2,
    /// Returned early after observing a stop request.
    Stopped = 3,
    /// Removed before it ever ran.
    Canceled = 4,
    /// Callback returned normally.
    Succeed = 5,
    /// Callback returned an error or panicked, or a dependency did not succeed.
    Failed = 6,
    /// Abandoned at an interruption point after a forced stop.
    ForceStopped = 7,
}

impl WorkStatus {
    /// Whether no further transition can happen (barring a requeue retry of `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkStatus::Stopped
                | WorkStatus::Canceled
                | WorkStatus::Succeed
                | WorkStatus::Failed
                | WorkStatus::ForceStopped
        )
    }

    pub fn is_success(self) -> bool {
        self == WorkStatus::Succeed
    }

    /// Running or Stopping.
    pub fn is_executing(self) -> bool {
        matches!(self, WorkStatus::Running | WorkStatus::Stopping)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => WorkStatus::Waiting,
            1 => WorkStatus::Running,
            2 => WorkStatus::Stopping,
            3 => WorkStatus::Stopped,
            4 => WorkStatus::Canceled,
            5 => WorkStatus::Succeed,
            6 => WorkStatus::Failed,
            7 => WorkStatus::ForceStopped,
            _ => return None,
        })
    }
}

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PoolState {
    /// Accepting submissions, not dispatching them yet.
    Suspended = 0,
    /// Dispatching work.
    Running = 1,
    /// Draining after a stop-all; returns to `Running` once no item runs.
    Stopping = 2,
    /// Terminal.
    Disposed = 3,
}

impl PoolState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => PoolState::Suspended,
            1 => PoolState::Running,
            2 => PoolState::Stopping,
            3 => PoolState::Disposed,
            _ => return None,
        })
    }
}
