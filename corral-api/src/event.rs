//! # Pool Events
//!
//! Lifecycle notifications raised synchronously by the pool on the thread
//! where the transition happened. Listeners register per [`EventKind`].
//!
//! For one work item the order is always `WorkStarted` → `WorkEnded` →
//! item callback → default callback. `PoolStarted` precedes the first
//! `WorkStarted` after the pool was idle and `PoolIdled` follows the last
//! item's callbacks.

use std::time::Duration;

use crate::id::WorkId;
use crate::options::RejectPolicy;
use crate::result::WorkResult;

/// Discriminant of a [`PoolEvent`], used as the registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PoolStarted,
    PoolIdled,
    WorkStarted,
    WorkEnded,
    WorkTimedOut,
    PoolTimedOut,
    WorkStopped,
    WorkCanceled,
    WorkRejected,
    RunningWorkerCountChanged,
    ErrorOccurred,
}

/// Where a handler failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// A listener for this event kind returned an error or panicked.
    Event(EventKind),
    /// The item's own completion callback failed.
    Callback,
    /// The pool's default completion callback failed.
    DefaultCallback,
}

#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// The pool left idle: the first item after idle is about to start.
    PoolStarted,
    /// The last pending item finished.
    PoolIdled { busy_for: Duration },
    WorkStarted { id: WorkId },
    /// One attempt finished. Retries raise this once per attempt.
    WorkEnded { result: WorkResult },
    WorkTimedOut { id: WorkId, forced: bool },
    PoolTimedOut { forced: bool },
    WorkStopped { id: WorkId, forced: bool },
    WorkCanceled { id: WorkId },
    /// An item was refused or evicted under backpressure.
    WorkRejected { id: WorkId, policy: RejectPolicy },
    RunningWorkerCountChanged { previous: usize, current: usize },
    ErrorOccurred {
        phase: ErrorPhase,
        id: Option<WorkId>,
        message: String,
    },
}

impl PoolEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PoolEvent::PoolStarted => EventKind::PoolStarted,
            PoolEvent::PoolIdled { .. } => EventKind::PoolIdled,
            PoolEvent::WorkStarted { .. } => EventKind::WorkStarted,
            PoolEvent::WorkEnded { .. } => EventKind::WorkEnded,
            PoolEvent::WorkTimedOut { .. } => EventKind::WorkTimedOut,
            PoolEvent::PoolTimedOut { .. } => EventKind::PoolTimedOut,
            PoolEvent::WorkStopped { .. } => EventKind::WorkStopped,
            PoolEvent::WorkCanceled { .. } => EventKind::WorkCanceled,
            PoolEvent::WorkRejected { .. } => EventKind::WorkRejected,
            PoolEvent::RunningWorkerCountChanged { .. } => EventKind::RunningWorkerCountChanged,
            PoolEvent::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    /// The work item this event is about, if any.
    pub fn work_id(&self) -> Option<&WorkId> {
        match self {
            PoolEvent::WorkStarted { id }
            | PoolEvent::WorkTimedOut { id, .. }
            | PoolEvent::WorkStopped { id, .. }
            | PoolEvent::WorkCanceled { id }
            | PoolEvent::WorkRejected { id, .. } => Some(id),
            PoolEvent::WorkEnded { result } => Some(&result.id),
            PoolEvent::ErrorOccurred { id, .. } => id.as_ref(),
            _ => None,
        }
    }
}
