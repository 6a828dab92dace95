//! # Error Types
//!
//! Every error a caller of the runtime can receive. The categories follow
//! where the failure is detected:
//!
//! - [`SubmitError`]: raised synchronously by `submit`, state unchanged
//! - [`ConfigError`]: invalid pool or group-relation configuration, raised at
//!   the call that introduced it
//! - [`ControlError`]: returned by the cooperative checkpoints a work callback
//!   calls; `Stopped` / `ForceStopped` are propagated out of the callback with `?`
//! - [`WaitError`]: a wait that ended without its target completing
//! - [`WorkError`]: the recorded cause of a non-success terminal status
//! - [`IdError`]: a fallible [`WorkId`] conversion

use thiserror::Error;

use crate::id::{IdKind, WorkId};
use crate::options::RejectPolicy;

/// Errors raised by `submit`.
#[derive(Error, Debug, Clone)]
pub enum SubmitError {
    #[error("Pool has been disposed")]
    Disposed,
    #[error("Work id already in use: {0}")]
    DuplicateId(WorkId),
    #[error("Work {id} rejected by {policy:?} policy: queue limit reached")]
    Rejected { id: WorkId, policy: RejectPolicy },
    #[error("Dependencies of {id} would create a cycle through {via}")]
    DependencyCycle { id: WorkId, via: WorkId },
    #[error("Invalid work options: {0}")]
    InvalidOptions(String),
}

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Minimum thread count {min} exceeds maximum {max}")]
    MinExceedsMax { min: usize, max: usize },
    #[error("Maximum thread count must be at least 1")]
    ZeroMaxThreads,
    #[error("Queue limit must be at least 1")]
    ZeroQueueLimit,
    #[error("Pool cannot generate {0} ids")]
    UnsupportedIdKind(IdKind),
    #[error("Relating group {parent} to {child} would create a cycle")]
    GroupRelationCycle { parent: String, child: String },
    #[error("Group {0} cannot be related to itself")]
    SelfRelation(String),
}

/// Outcome of a cooperative checkpoint.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The checkpoint was called from a thread that is not executing a work item.
    #[error("Checkpoint called outside of a running work item")]
    NotOnWorkerThread,
    #[error("Work stop requested")]
    Stopped,
    #[error("Work force-stopped")]
    ForceStopped,
}

/// A wait that ended without observing completion.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("Wait canceled by caller")]
    Canceled,
    #[error("Pool disposed while waiting")]
    Disposed,
}

/// Recorded cause of a non-success terminal status.
#[derive(Error, Debug, Clone)]
pub enum WorkError {
    #[error("Work panicked: {0}")]
    Panicked(String),
    #[error("Work {id} not run: dependency {dependency} did not succeed")]
    DependencyFailed { id: WorkId, dependency: WorkId },
    #[error("Work canceled before it started")]
    Canceled,
    #[error("Work terminated because the pool was disposed")]
    Disposed,
    #[error("Work discarded by {0:?} policy")]
    Discarded(RejectPolicy),
}

/// Failed [`WorkId`] conversion.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdError {
    #[error("Expected a {expected} id, found a {found} id")]
    WrongKind { expected: IdKind, found: IdKind },
    #[error("Id is absent")]
    Absent,
}
