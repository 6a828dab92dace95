// Shared helpers for the corral integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use corral::{EventKind, Pool, PoolConfig, PoolEvent, QueueDiscipline};
use parking_lot::Mutex;

/// Upper bound for anything a test waits on
pub const PATIENCE: Duration = Duration::from_secs(5);

pub fn pool(max_threads: usize) -> Pool {
    corral::logging::init_for_tests();
    Pool::new(PoolConfig::default().with_max_threads(max_threads)).unwrap()
}

/// A suspended single-worker pool, so queued order is observable after `start`.
pub fn single_worker(discipline: QueueDiscipline) -> Pool {
    corral::logging::init_for_tests();
    Pool::new(
        PoolConfig::default()
            .with_max_threads(1)
            .with_discipline(discipline)
            .suspended(),
    )
    .unwrap()
}

/// Poll `condition` until it holds or `PATIENCE` runs out.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Ordered log shared between listeners, callbacks and work items.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }
}

/// Record every event of `kinds` raised by `pool`.
pub fn record_events(pool: &Pool, kinds: &[EventKind]) -> Arc<Mutex<Vec<PoolEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let events = Arc::clone(&events);
        pool.on(*kind, move |event| {
            events.lock().push(event.clone());
            Ok(())
        });
    }
    events
}
