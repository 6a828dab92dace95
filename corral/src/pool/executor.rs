//! # Item Execution
//!
//! Runs on whichever thread claimed the item: a shared worker, a dedicated
//! thread, a caller-runs submitter or a helping waiter.
//!
//! ## Per attempt
//! 1. Stamp the start time, arm the item timeout, raise `WorkStarted`
//! 2. Block while paused, then invoke the callback under `catch_unwind`
//! 3. Classify the outcome, raise `WorkEnded`, run the item callback and the
//!    pool's default callback
//! 4. Retry in place, requeue, or finish
//!
//! Finishing records the result, wakes waiters and settles the item in the
//! dependency graph, which may release or fail its dependents.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use corral_api::{
    ErrorPhase, PoolEvent, PoolState, WorkCallback, WorkError, WorkResult, WorkStatus,
};
use tracing::{debug, trace};

use super::PoolInner;
use crate::control::ExecutionScope;
use crate::work::retry::{self, RetryDecision};
use crate::work::{Attempt, WorkItem, panic_message};

impl PoolInner {
    /// Claim and run `item` on the current thread. A no-op if another thread
    /// claimed it first or it was canceled while queued.
    pub(crate) fn execute(self: &Arc<Self>, item: Arc<WorkItem>) {
        if !item.claim() {
            trace!(work_id = %item.id, status = ?item.status(), "skipping item that is no longer waiting");
            return;
        }
        if self.paused.load(Ordering::SeqCst) {
            item.control.set_pool_pause(true);
            // resume_all may have swept the registry before we set the flag
            if !self.paused.load(Ordering::SeqCst) {
                item.control.set_pool_pause(false);
            }
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        self.enter_busy();

        let span = crate::work_span!(item.id, priority = item.priority);
        let _entered = span.enter();
        trace!(thread_priority = ?item.thread_priority, "thread priority hint not applied");

        loop {
            let attempt = self.attempt(&item);
            let status = attempt.status;
            let result = item.result(status, attempt.value, attempt.error);
            debug!(status = ?status, retries = result.retries, "work ended");
            self.events.emit(PoolEvent::WorkEnded {
                result: result.clone(),
            });
            self.run_callbacks(&item, &result);

            let stop = result.retry_stopped() || item.control.stop_requested();
            match retry::decide(item.retry.as_ref(), status, item.retries(), stop) {
                RetryDecision::Immediate => {
                    let retries = item.count_retry();
                    debug!(retries, "retrying in place");
                }
                RetryDecision::Requeue if self.requeue(&item) => return,
                RetryDecision::Requeue | RetryDecision::Finish => {
                    self.finish_executed(&item, status, result);
                    return;
                }
            }
        }
    }

    fn attempt(self: &Arc<Self>, item: &Arc<WorkItem>) -> Attempt {
        item.mark_started();
        self.arm_item_timeout(item);
        self.events.emit(PoolEvent::WorkStarted {
            id: item.id.clone(),
        });
        debug!(attempt = item.retries() + 1, "work started");

        let outcome = {
            let _scope = ExecutionScope::enter(&item.control);
            match item.control.wait_while_paused() {
                Ok(()) => panic::catch_unwind(AssertUnwindSafe(|| item.invoke())),
                Err(e) => Ok(Err(e.into())),
            }
        };

        item.mark_ended();
        item.disarm_timeout();
        Attempt::classify(outcome, item.control.force_requested())
    }

    /// Arm the item's timeout for the attempt about to start.
    fn arm_item_timeout(self: &Arc<Self>, item: &Arc<WorkItem>) {
        let Some(timeout) = item.timeout else {
            return;
        };
        let attempt = item.retries();
        let pool = Arc::downgrade(self);
        let target = Arc::downgrade(item);
        let handle = self.timer.schedule(timeout.duration, move || {
            let (Some(pool), Some(item)) = (pool.upgrade(), target.upgrade()) else {
                return;
            };
            // a late timer must not hit the next attempt
            if item.retries() == attempt && item.status().is_executing() {
                pool.on_work_timeout(&item, timeout.force);
            }
        });
        match handle {
            Some(handle) => item.arm_timeout(handle),
            None => trace!(work_id = %item.id, "timeout beyond clock range, not armed"),
        }
    }

    /// Back to the queue as a waiting item. `false` if the item can no longer be requeued.
    fn requeue(self: &Arc<Self>, item: &Arc<WorkItem>) -> bool {
        if self.state() == PoolState::Disposed {
            return false;
        }
        if item
            .transition_any(&[WorkStatus::Running, WorkStatus::Stopping], WorkStatus::Failed)
            .is_none()
        {
            return false;
        }
        // only the executing thread moves a failed item
        item.transition(WorkStatus::Failed, WorkStatus::Waiting);
        let retries = item.count_retry();
        item.mark_requeued();
        debug!(retries, "requeued for retry");
        self.leave_active();
        self.enqueue(Arc::clone(item));
        true
    }

    fn finish_executed(self: &Arc<Self>, item: &Arc<WorkItem>, status: WorkStatus, result: WorkResult) {
        item.transition_any(&[WorkStatus::Running, WorkStatus::Stopping], status);
        self.record(item, result);
        self.settle(item, status.is_success());
        self.leave_active();
        self.release_pending();
    }

    /// Terminal path for an item that never ran: canceled, discarded,
    /// disposed or failed by a dependency. The caller already moved its status.
    pub(super) fn finish_unstarted(self: &Arc<Self>, item: &Arc<WorkItem>, cause: WorkError) {
        self.conclude_unstarted(item, cause);
        self.settle(item, false);
        self.release_pending();
    }

    fn conclude_unstarted(&self, item: &Arc<WorkItem>, cause: WorkError) {
        let status = item.status();
        let event = match &cause {
            WorkError::Discarded(policy) => Some(PoolEvent::WorkRejected {
                id: item.id.clone(),
                policy: *policy,
            }),
            WorkError::Canceled | WorkError::Disposed => Some(PoolEvent::WorkCanceled {
                id: item.id.clone(),
            }),
            WorkError::Panicked(_) | WorkError::DependencyFailed { .. } => None,
        };
        debug!(work_id = %item.id, ?status, cause = %cause, "work finished without running");

        let result = item.result(status, None, Some(Arc::new(anyhow::Error::new(cause))));
        if let Some(event) = event {
            self.events.emit(event);
        }
        self.run_callbacks(item, &result);
        self.record(item, result);
    }

    /// Publish the terminal result: store it if retained. The live entry
    /// stays until the item settles.
    fn record(&self, item: &WorkItem, result: WorkResult) {
        if item.retain_result {
            self.results.insert(item.id.clone(), result.clone());
        }
        item.complete(result);
    }

    /// Settle `item` in the dependency graph, releasing or failing dependents
    /// transitively. Each settled item then leaves the registry and wakes its waiters.
    fn settle(self: &Arc<Self>, item: &Arc<WorkItem>, success: bool) {
        let mut pending = vec![(Arc::clone(item), success)];
        while let Some((settled, success)) = pending.pop() {
            let id = &settled.id;
            let settlement = self.graph.settle(id, success, settled.retain_result);
            // the id is free for reuse only once its successors are resolved
            self.items.remove(id);
            if !settled.retain_result {
                // after the removal, so a concurrent `Group::add` sees the item gone
                self.groups.forget(id);
            }
            settled.release_waiters();
            for released in settlement.released {
                if let Some(item) = self.item(&released) {
                    trace!(work_id = %released, "dependencies met");
                    self.enqueue(item);
                }
            }
            for failed in settlement.failed {
                let Some(successor) = self.item(&failed) else {
                    continue;
                };
                if !successor.transition(WorkStatus::Waiting, WorkStatus::Failed) {
                    continue;
                }
                self.conclude_unstarted(
                    &successor,
                    WorkError::DependencyFailed {
                        id: failed.clone(),
                        dependency: id.clone(),
                    },
                );
                pending.push((successor, false));
                self.release_pending();
            }
        }
    }

    fn leave_active(self: &Arc<Self>) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.try_finish_stopping();
        }
    }

    /// Stopping → Running once nothing is executing.
    pub(super) fn try_finish_stopping(self: &Arc<Self>) {
        if self.active.load(Ordering::SeqCst) == 0
            && self.state.transition(PoolState::Stopping, PoolState::Running)
        {
            debug!("stop-all drained, pool running again");
            self.wake_for_backlog();
        }
    }

    /// Item callback, then the pool default. Failures are reported, never raised.
    fn run_callbacks(&self, item: &WorkItem, result: &WorkResult) {
        if let Some(callback) = &item.callback {
            self.invoke_callback(callback, result, ErrorPhase::Callback);
        }
        let default = self.default_callback.read().clone();
        if let Some(callback) = default {
            self.invoke_callback(&callback, result, ErrorPhase::DefaultCallback);
        }
    }

    fn invoke_callback(&self, callback: &WorkCallback, result: &WorkResult, phase: ErrorPhase) {
        let message = match panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("callback panicked: {}", panic_message(payload.as_ref())),
        };
        self.events.report(phase, Some(result.id.clone()), message);
    }
}
