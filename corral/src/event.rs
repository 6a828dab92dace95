//! # Event Bus
//!
//! Ordered listener lists keyed by [`EventKind`]. Listeners run synchronously
//! on the thread that raised the event, in registration order.
//!
//! A listener that returns `Err` or panics does not affect the caller: the
//! failure is logged and re-raised as [`PoolEvent::ErrorOccurred`] tagged with
//! the originating phase. Failures of `ErrorOccurred` listeners themselves are
//! only logged.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use corral_api::{ErrorPhase, EventKind, PoolEvent, WorkId};
use parking_lot::RwLock;
use tracing::error;

use crate::work::panic_message;

pub type Listener = Arc<dyn Fn(&PoolEvent) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    kind: EventKind,
    seq: u64,
}

impl ListenerId {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<(u64, Listener)>>>,
    next: AtomicU64,
}

impl EventBus {
    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((seq, listener));
        ListenerId { kind, seq }
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.get_mut(&id.kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(seq, _)| *seq != id.seq);
                list.len() != before
            }
            None => false,
        }
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listeners
            .read()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    pub fn emit(&self, event: PoolEvent) {
        let kind = event.kind();
        // snapshot so listeners may (un)register without deadlocking
        let listeners: Vec<Listener> = match self.listeners.read().get(&kind) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        for listener in listeners {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => format!("listener panicked: {}", panic_message(payload.as_ref())),
            };
            if kind == EventKind::ErrorOccurred {
                error!(error = %message, "error listener failed");
            } else {
                self.report(ErrorPhase::Event(kind), event.work_id().cloned(), message);
            }
        }
    }

    /// Log a handler failure and raise `ErrorOccurred` for it.
    pub fn report(&self, phase: ErrorPhase, id: Option<WorkId>, message: String) {
        error!(?phase, work_id = ?id, error = %message, "handler failed");
        self.emit(PoolEvent::ErrorOccurred { phase, id, message });
    }
}
