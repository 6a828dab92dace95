//! Pause, resume, stop, force-stop and cancel, per item and pool-wide.
//!
//! Stopping is cooperative: the callback observes the request at its next
//! checkpoint. A stop or force-stop that reaches an item before it started
//! cancels it instead.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use corral_api::{PoolEvent, PoolState, WorkError, WorkId, WorkStatus};
use tracing::{debug, info, warn};

use super::{Pool, PoolInner};
use crate::work::WorkItem;

impl PoolInner {
    fn pause_item(&self, item: &WorkItem) -> bool {
        !item.status().is_terminal() && item.control.pause()
    }

    fn resume_item(&self, item: &WorkItem) -> bool {
        item.control.resume()
    }

    /// Waiting → Canceled with `cause`. `false` if the item already left `Waiting`.
    pub(super) fn cancel_waiting(self: &Arc<Self>, item: &Arc<WorkItem>, cause: WorkError) -> bool {
        if !item.transition(WorkStatus::Waiting, WorkStatus::Canceled) {
            return false;
        }
        self.unqueue(item);
        self.finish_unstarted(item, cause);
        true
    }

    pub(super) fn stop_item(self: &Arc<Self>, item: &Arc<WorkItem>) -> bool {
        loop {
            match item.status() {
                WorkStatus::Waiting => {
                    if self.cancel_waiting(item, WorkError::Canceled) {
                        return true;
                    }
                }
                WorkStatus::Running => {
                    if item.transition(WorkStatus::Running, WorkStatus::Stopping) {
                        item.control.request_stop();
                        debug!(work_id = %item.id, "stop requested");
                        self.events.emit(PoolEvent::WorkStopped {
                            id: item.id.clone(),
                            forced: false,
                        });
                        return true;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Only the first force request for an item returns `true`.
    pub(super) fn force_stop_item(self: &Arc<Self>, item: &Arc<WorkItem>) -> bool {
        loop {
            match item.status() {
                WorkStatus::Waiting => {
                    if self.cancel_waiting(item, WorkError::Canceled) {
                        return true;
                    }
                }
                WorkStatus::Running | WorkStatus::Stopping => {
                    item.transition(WorkStatus::Running, WorkStatus::Stopping);
                    if !item.control.request_force() {
                        return false;
                    }
                    warn!(work_id = %item.id, "force stop requested");
                    self.events.emit(PoolEvent::WorkStopped {
                        id: item.id.clone(),
                        forced: true,
                    });
                    return true;
                }
                _ => return false,
            }
        }
    }

    fn pause_all(&self) {
        self.paused.store(true, Ordering::SeqCst);
        for item in self.snapshot_items() {
            item.control.set_pool_pause(true);
        }
        info!(pool_id = self.id, "pool paused");
    }

    fn resume_all(&self, include_individual: bool) {
        self.paused.store(false, Ordering::SeqCst);
        for item in self.snapshot_items() {
            item.control.set_pool_pause(false);
            if include_individual {
                item.control.resume();
            }
        }
        info!(pool_id = self.id, include_individual, "pool resumed");
    }

    /// Cancel waiting items and ask running ones to stop. A running pool
    /// drains through `Stopping` and resumes dispatch once nothing executes.
    pub(super) fn stop_all(self: &Arc<Self>, forced: bool) -> usize {
        if self.state() == PoolState::Disposed {
            return 0;
        }
        let draining = self.state.transition(PoolState::Running, PoolState::Stopping);
        info!(pool_id = self.id, forced, draining, "stopping all work");

        let mut affected = 0;
        for item in self.snapshot_items() {
            let hit = if forced {
                self.force_stop_item(&item)
            } else {
                self.stop_item(&item)
            };
            affected += usize::from(hit);
        }
        if draining {
            self.try_finish_stopping();
        }
        affected
    }

    fn cancel_all(self: &Arc<Self>) -> usize {
        self.snapshot_items()
            .iter()
            .filter(|item| self.cancel_waiting(item, WorkError::Canceled))
            .count()
    }

    pub(super) fn on_work_timeout(self: &Arc<Self>, item: &Arc<WorkItem>, forced: bool) {
        warn!(work_id = %item.id, forced, "work timed out");
        self.events.emit(PoolEvent::WorkTimedOut {
            id: item.id.clone(),
            forced,
        });
        if forced {
            self.force_stop_item(item);
        } else {
            self.stop_item(item);
        }
    }

    pub(super) fn on_pool_timeout(self: &Arc<Self>, period: u64, forced: bool) {
        // the period may have ended (and another begun) while the timer fired
        if self.busy_period() != Some(period) {
            return;
        }
        warn!(pool_id = self.id, forced, "pool timed out");
        self.events.emit(PoolEvent::PoolTimedOut { forced });
        self.stop_all(forced);
    }
}

impl Pool {
    /// Pause one item. A waiting item blocks before its callback starts;
    /// a running one blocks at its next checkpoint.
    pub fn pause(&self, id: &WorkId) -> bool {
        self.inner
            .item(id)
            .is_some_and(|item| self.inner.pause_item(&item))
    }

    /// Lift an individual pause. A pool-wide pause stays in effect.
    pub fn resume(&self, id: &WorkId) -> bool {
        self.inner
            .item(id)
            .is_some_and(|item| self.inner.resume_item(&item))
    }

    /// Request a cooperative stop; cancels the item if it has not started.
    pub fn stop(&self, id: &WorkId) -> bool {
        self.inner
            .item(id)
            .is_some_and(|item| self.inner.stop_item(&item))
    }

    /// Abandon the item at its next interruption point. The item ends
    /// `ForceStopped` whatever its callback returns. Only the first caller
    /// gets `true`.
    pub fn force_stop(&self, id: &WorkId) -> bool {
        self.inner
            .item(id)
            .is_some_and(|item| self.inner.force_stop_item(&item))
    }

    /// Cancel an item that has not started yet.
    pub fn cancel(&self, id: &WorkId) -> bool {
        self.inner
            .item(id)
            .is_some_and(|item| self.inner.cancel_waiting(&item, WorkError::Canceled))
    }

    pub fn pause_many(&self, ids: &[WorkId]) -> Vec<bool> {
        ids.iter().map(|id| self.pause(id)).collect()
    }

    pub fn resume_many(&self, ids: &[WorkId]) -> Vec<bool> {
        ids.iter().map(|id| self.resume(id)).collect()
    }

    pub fn stop_many(&self, ids: &[WorkId]) -> Vec<bool> {
        ids.iter().map(|id| self.stop(id)).collect()
    }

    pub fn force_stop_many(&self, ids: &[WorkId]) -> Vec<bool> {
        ids.iter().map(|id| self.force_stop(id)).collect()
    }

    pub fn cancel_many(&self, ids: &[WorkId]) -> Vec<bool> {
        ids.iter().map(|id| self.cancel(id)).collect()
    }

    /// Pause every current item and every item claimed until [`resume_all`](Self::resume_all).
    pub fn pause_all(&self) {
        self.inner.pause_all();
    }

    /// Lift the pool-wide pause; with `include_individual`, individual pauses too.
    pub fn resume_all(&self, include_individual: bool) {
        self.inner.resume_all(include_individual);
    }

    /// Cancel every waiting item and request a stop of every running one.
    /// Returns the number of items affected.
    pub fn stop_all(&self) -> usize {
        self.inner.stop_all(false)
    }

    /// Force-stop everything in flight. Among concurrent callers exactly one
    /// gets `true`; the attribution resets when the pool next goes idle.
    pub fn force_stop_all(&self) -> bool {
        let inner = &self.inner;
        if inner
            .force_stop_all
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        inner.stop_all(true);
        if inner.pending.load(Ordering::SeqCst) == 0 {
            inner.force_stop_all.store(false, Ordering::SeqCst);
        }
        true
    }

    /// Cancel every item that has not started. Returns how many were canceled.
    pub fn cancel_all(&self) -> usize {
        self.inner.cancel_all()
    }
}
