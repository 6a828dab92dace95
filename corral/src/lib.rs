// Corral work-scheduling runtime
//
// An in-process pool of OS worker threads that runs prioritized work items
// with per-worker stealable queues, dependencies between items, named groups,
// cooperative pause/stop, retries, timeouts and lifecycle events. Shared data
// types live in `corral-api` and are re-exported here.

pub mod collection;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod group;
pub mod logging;
pub mod pool;
pub mod signal;

mod dependency;
mod state;
mod timer;
mod work;
mod worker;

// Re-export commonly used types
pub use config::{PoolConfig, QueueDiscipline, StealPolicy};
pub use error::PoolError;
pub use event::{Listener, ListenerId};
pub use group::Group;
pub use pool::{Pool, WaitOptions};
pub use signal::{AsyncManualResetEvent, CancelSignal, ManualResetEvent};
pub use worker::WorkerCounts;

pub use corral_api::{
    ConfigError, ControlError, ErrorPhase, EventKind, IdError, IdKind, PoolEvent, PoolState,
    RejectPolicy, RetryBehavior, RetryOption, RetryPolicy, SubmitError, ThreadPriority,
    TimeoutOption, WaitError, WorkCallback, WorkError, WorkId, WorkOptions, WorkPlacement,
    WorkResult, WorkStatus, WorkValue, priority,
};
