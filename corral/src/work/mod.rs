//! # Work Items
//!
//! The runtime-side record of one submission ([`WorkItem`]) and the rules
//! that turn one execution attempt into a [`WorkStatus`].
//!
//! ## Attempt classification
//!
//! | callback outcome                     | status         |
//! |--------------------------------------|----------------|
//! | `Ok(value)`                          | `Succeed`      |
//! | `Err` wrapping `ControlError::Stopped`      | `Stopped`      |
//! | `Err` wrapping `ControlError::ForceStopped` | `ForceStopped` |
//! | any other `Err`, or a panic          | `Failed`       |
//!
//! A pending forced stop overrides all of the above: the attempt ends
//! `ForceStopped` and any returned value is discarded.

mod item;
pub(crate) mod retry;

pub(crate) use item::{Job, WorkItem};

use std::any::Any;
use std::sync::Arc;

use corral_api::{ControlError, WorkError, WorkStatus, WorkValue};

/// Classified result of one callback invocation.
pub(crate) struct Attempt {
    pub status: WorkStatus,
    pub value: Option<WorkValue>,
    pub error: Option<Arc<anyhow::Error>>,
}

impl Attempt {
    pub fn classify(
        outcome: std::thread::Result<anyhow::Result<WorkValue>>,
        forced: bool,
    ) -> Self {
        let (status, value, error) = match outcome {
            Ok(Ok(value)) => (WorkStatus::Succeed, Some(value), None),
            Ok(Err(error)) => {
                let status = match error.downcast_ref::<ControlError>() {
                    Some(ControlError::Stopped) => WorkStatus::Stopped,
                    Some(ControlError::ForceStopped) => WorkStatus::ForceStopped,
                    _ => WorkStatus::Failed,
                };
                (status, None, Some(error))
            }
            Err(payload) => {
                let error = anyhow::Error::new(WorkError::Panicked(panic_message(payload.as_ref())));
                (WorkStatus::Failed, None, Some(error))
            }
        };

        if forced {
            return Self {
                status: WorkStatus::ForceStopped,
                value: None,
                error: Some(Arc::new(
                    error.unwrap_or_else(|| anyhow::Error::new(ControlError::ForceStopped)),
                )),
            };
        }
        Self {
            status,
            value,
            error: error.map(Arc::new),
        }
    }
}

/// Human-readable text of a panic payload (`String` and `&str` payloads).
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}
