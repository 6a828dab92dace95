//! Placement of ready items onto threads and queues.

use std::sync::Arc;
use std::sync::atomic::{self, Ordering};

use corral_api::{PoolState, WorkPlacement};
use tracing::{error, trace, warn};

use super::PoolInner;
use crate::work::WorkItem;
use crate::worker::{self, Wake, Worker, spawn_dedicated};

impl PoolInner {
    /// Try to put `item` somewhere other than the global queue.
    ///
    /// Returns the item back when only the global queue is left, so the
    /// caller can apply backpressure before queueing it.
    pub(super) fn place(self: &Arc<Self>, item: Arc<WorkItem>) -> Option<Arc<WorkItem>> {
        if self.state() != PoolState::Running {
            return Some(item);
        }

        if item.long_running {
            match spawn_dedicated(self, &item) {
                Ok(()) => {
                    trace!(work_id = %item.id, "placed on a dedicated thread");
                    return None;
                }
                Err(e) => {
                    warn!(work_id = %item.id, error = %e, "no dedicated thread, queueing instead");
                    return Some(item);
                }
            }
        }

        let here = worker::current(self.id);
        if item.placement == WorkPlacement::PreferLocal {
            if let Some(worker) = &here {
                push_local(worker, item);
                return None;
            }
        }

        if self.hand_off(&item) {
            return None;
        }

        if item.placement == WorkPlacement::PreferIdleThenLocal {
            if let Some(worker) = &here {
                push_local(worker, item);
                return None;
            }
        }

        if self.spawn_worker(Some(&item)) {
            return None;
        }
        Some(item)
    }

    /// Place `item`, falling back to the global queue without a bound check.
    ///
    /// Used for items the pool already accepted: released dependents,
    /// requeued retries.
    pub(super) fn enqueue(self: &Arc<Self>, item: Arc<WorkItem>) {
        if let Some(item) = self.place(item) {
            self.enqueue_global(item);
        }
    }

    pub(super) fn enqueue_global(self: &Arc<Self>, item: Arc<WorkItem>) {
        let priority = item.priority;
        self.global.set(item, priority);
        // pairs with the fence an idle worker issues before re-checking the queues
        atomic::fence(Ordering::SeqCst);
        self.wake_idle();
    }

    /// Drop a queued entry for `item` so it stops counting against the backlog.
    pub(super) fn unqueue(&self, item: &Arc<WorkItem>) {
        let same = |queued: &Arc<WorkItem>| Arc::ptr_eq(queued, item);
        if self.global.discard_if(&same).is_some() {
            return;
        }
        for worker in self.workers() {
            if worker.local.discard_if(&same).is_some() {
                return;
            }
        }
    }

    /// Hand `item` straight to an idle worker.
    fn hand_off(&self, item: &Arc<WorkItem>) -> bool {
        self.workers()
            .iter()
            .any(|worker| worker.is_idle() && worker.try_hand_off(self, item))
    }

    /// Start a new shared worker, optionally with `first` in its local queue.
    ///
    /// Fails when the pool already has `max_threads` shared workers or the
    /// thread cannot be spawned; `first` is then left to the caller.
    pub(super) fn spawn_worker(self: &Arc<Self>, first: Option<&Arc<WorkItem>>) -> bool {
        let Some(reserved) = self.counts.reserve_running(self.max_threads()) else {
            return false;
        };
        self.count_changed(Some(reserved));

        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::new(self, id);
        if let Some(item) = first {
            worker.local.set(Arc::clone(item), item.priority);
        }
        // registered before the thread runs so its exit always finds the entry
        self.workers.write().push(Arc::clone(&worker));

        match worker.start(self) {
            Ok(()) => {
                trace!(worker_id = id, "spawned worker");
                true
            }
            Err(e) => {
                error!(worker_id = id, error = %e, "failed to spawn worker thread");
                self.remove_worker(id);
                worker.local.drain();
                self.count_changed(self.counts.release_running());
                false
            }
        }
    }

    /// Make sure someone picks up the global backlog: wake idle workers,
    /// then grow the pool if they are not enough.
    pub(crate) fn wake_idle(self: &Arc<Self>) {
        if self.state() != PoolState::Running {
            return;
        }
        let mut backlog = self.global.len().max(1);
        for worker in self.workers() {
            if backlog == 0 {
                return;
            }
            if worker.is_idle() {
                worker.notify(Wake::Work);
                backlog -= 1;
            }
        }
        while backlog > 0 && self.spawn_worker(None) {
            backlog -= 1;
        }
    }

    /// Wake whoever owns queued work, after a start or a drained stop-all.
    pub(super) fn wake_for_backlog(self: &Arc<Self>) {
        for worker in self.workers() {
            if !worker.local.is_empty() {
                worker.notify(Wake::Work);
            }
        }
        if !self.global.is_empty() {
            self.wake_idle();
        }
    }
}

fn push_local(worker: &Worker, item: Arc<WorkItem>) {
    trace!(worker_id = worker.id, work_id = %item.id, "queued locally");
    let priority = item.priority;
    worker.local.set(item, priority);
}
