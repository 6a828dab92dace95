//! # Corral API
//!
//! Data types shared between callers of the corral runtime and the runtime
//! itself. Nothing in this crate spawns threads or holds locks: it describes
//! *what* a unit of work is and *what* can happen to it, while the `corral`
//! crate decides how and where it runs.
//!
//! ## Core Components
//!
//! - [`WorkId`]: tagged identifier of a submitted work item, with an explicit
//!   absent variant
//! - [`WorkStatus`] / [`PoolState`]: the state machines callers observe
//! - [`WorkOptions`]: per-item metadata (priority, group, dependencies, retry,
//!   timeout, placement hints, callback)
//! - [`WorkResult`]: terminal record of an execution, including timestamps
//! - [`PoolEvent`]: lifecycle notifications raised by the pool
//! - [`errors`]: every error a caller can receive
//!
//! ## Usage Example
//!
//! ```rust
//! use corral_api::{WorkId, WorkOptions, RetryOption};
//!
//! let options = WorkOptions::default()
//!     .with_id("nightly-report")
//!     .with_priority(corral_api::priority::HIGH)
//!     .in_group("reports")
//!     .with_retry(RetryOption::limited(3));
//!
//! assert_eq!(options.custom_id, Some(WorkId::from("nightly-report")));
//! ```

pub mod errors;
pub mod event;
pub mod id;
pub mod options;
pub mod priority;
pub mod result;
pub mod status;

pub use errors::{ConfigError, ControlError, IdError, SubmitError, WaitError, WorkError};
pub use event::{ErrorPhase, EventKind, PoolEvent};
pub use id::{IdKind, WorkId};
pub use options::{
    RejectPolicy, RetryBehavior, RetryOption, RetryPolicy, ThreadPriority, TimeoutOption,
    WorkCallback, WorkOptions, WorkPlacement,
};
pub use result::{WorkResult, WorkValue};
pub use status::{PoolState, WorkStatus};
