//! Submission: validation, registration, dependency admission and backpressure.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use corral_api::{
    IdKind, PoolEvent, PoolState, RejectPolicy, SubmitError, WorkError, WorkId, WorkOptions,
    WorkStatus, WorkValue,
};
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace};

use super::{Pool, PoolInner};
use crate::dependency::Admission;
use crate::work::{Job, WorkItem};

fn validate(options: &WorkOptions) -> Result<(), SubmitError> {
    if options.custom_id.as_ref().is_some_and(WorkId::is_none) {
        return Err(SubmitError::InvalidOptions("custom id must not be absent".into()));
    }
    if options.dependencies.iter().any(WorkId::is_none) {
        return Err(SubmitError::InvalidOptions("dependency id must not be absent".into()));
    }
    if options.group.as_deref().is_some_and(str::is_empty) {
        return Err(SubmitError::InvalidOptions("group name must not be empty".into()));
    }
    if options.timeout.is_some_and(|timeout| timeout.duration.is_zero()) {
        return Err(SubmitError::InvalidOptions("timeout must be non-zero".into()));
    }
    Ok(())
}

impl PoolInner {
    fn next_id(&self) -> WorkId {
        match self.config.id_kind {
            IdKind::Guid => WorkId::new_guid(),
            // validated at construction: names are never generated
            IdKind::Sequential | IdKind::Name => {
                WorkId::Seq(self.next_seq.fetch_add(1, Ordering::Relaxed))
            }
        }
    }

    fn submit_job(self: &Arc<Self>, job: Job, options: WorkOptions) -> Result<WorkId, SubmitError> {
        if self.state() == PoolState::Disposed {
            return Err(SubmitError::Disposed);
        }
        validate(&options)?;
        let id = match &options.custom_id {
            Some(id) => id.clone(),
            None => self.next_id(),
        };
        let item = Arc::new(WorkItem::new(id.clone(), options, &self.config, job));

        self.acquire_pending();
        let admission = match self.register(&item) {
            Ok(admission) => admission,
            Err(e) => {
                self.release_pending();
                return Err(e);
            }
        };
        if let Some(group) = &item.group {
            self.groups.add(group, &id);
        }
        trace!(work_id = %id, priority = item.priority, ?admission, "work submitted");

        // dispose may have swept the registry before the insert
        if self.state() == PoolState::Disposed {
            self.cancel_waiting(&item, WorkError::Disposed);
            return Ok(id);
        }
        if self.state() == PoolState::Suspended && !self.config.start_suspended {
            self.start();
        }

        match admission {
            Admission::Ready => self.admit(item),
            Admission::Held => Ok(id),
            Admission::Failed { dependency } => {
                if item.transition(WorkStatus::Waiting, WorkStatus::Failed) {
                    self.finish_unstarted(
                        &item,
                        WorkError::DependencyFailed {
                            id: id.clone(),
                            dependency,
                        },
                    );
                }
                Ok(id)
            }
        }
    }

    /// Insert into the registry and the dependency graph, or neither.
    fn register(&self, item: &Arc<WorkItem>) -> Result<Admission, SubmitError> {
        match self.items.entry(item.id.clone()) {
            Entry::Occupied(_) => Err(SubmitError::DuplicateId(item.id.clone())),
            Entry::Vacant(slot) => {
                if self.results.contains_key(&item.id) {
                    return Err(SubmitError::DuplicateId(item.id.clone()));
                }
                let admission = self.graph.add(&item.id, &item.dependencies)?;
                slot.insert(Arc::clone(item));
                Ok(admission)
            }
        }
    }

    /// Place a ready item, applying the reject policy if only a full global queue is left.
    fn admit(self: &Arc<Self>, item: Arc<WorkItem>) -> Result<WorkId, SubmitError> {
        let id = item.id.clone();
        let Some(item) = self.place(item) else {
            return Ok(id);
        };
        match self.config.queue_limit {
            Some(limit) if self.global.len() >= limit => self.reject(item),
            _ => {
                self.enqueue_global(item);
                Ok(id)
            }
        }
    }

    fn reject(self: &Arc<Self>, item: Arc<WorkItem>) -> Result<WorkId, SubmitError> {
        let policy = self.config.reject_policy;
        let id = item.id.clone();
        debug!(work_id = %id, ?policy, "queue limit reached");
        match policy {
            RejectPolicy::Abort => {
                self.withdraw(&item);
                self.events.emit(PoolEvent::WorkRejected {
                    id: id.clone(),
                    policy,
                });
                Err(SubmitError::Rejected { id, policy })
            }
            RejectPolicy::CallerRuns => {
                self.execute(item);
                Ok(id)
            }
            RejectPolicy::Discard => {
                self.cancel_waiting(&item, WorkError::Discarded(policy));
                Ok(id)
            }
            RejectPolicy::DiscardOldest => {
                if let Some(victim) = self.global.discard_if(&|queued: &Arc<WorkItem>| queued.is_waiting()) {
                    debug!(work_id = %victim.id, "evicted to make room");
                    self.cancel_waiting(&victim, WorkError::Discarded(policy));
                }
                self.enqueue_global(item);
                Ok(id)
            }
        }
    }

    /// Undo a registration that never became visible to workers.
    fn withdraw(&self, item: &WorkItem) {
        self.items.remove(&item.id);
        self.graph.withdraw(&item.id);
        self.groups.forget(&item.id);
        self.release_pending();
    }
}

impl Pool {
    /// Submit a unit of work.
    ///
    /// The callback may be invoked more than once when `options.retry` asks
    /// for immediate retries. Its `Ok` value is stored on the result and can
    /// be read back with [`WorkResult::value_as`](corral_api::WorkResult::value_as).
    ///
    /// Dependencies on ids that are not known yet stay open until an item
    /// with that id is submitted and settles. Until then the item is held
    /// `Waiting` and [`wait_all`](Self::wait_all) does not return; release
    /// it with [`cancel`](Self::cancel) if the predecessor never arrives.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::Disposed`] after [`dispose`](Self::dispose)
    /// - [`SubmitError::DuplicateId`] if the custom id is live or retained
    /// - [`SubmitError::DependencyCycle`] if the dependencies close a cycle
    /// - [`SubmitError::Rejected`] when the queue is full under `RejectPolicy::Abort`
    /// - [`SubmitError::InvalidOptions`] for absent ids, empty group names or zero timeouts
    pub fn submit<F, T>(&self, f: F, options: WorkOptions) -> Result<WorkId, SubmitError>
    where
        F: FnMut() -> anyhow::Result<T> + Send + 'static,
        T: Any + Send + Sync,
    {
        let mut f = f;
        let job: Job = Box::new(move || f().map(|value| Arc::new(value) as WorkValue));
        self.inner.submit_job(job, options)
    }

    /// Submit with default options.
    pub fn submit_default<F, T>(&self, f: F) -> Result<WorkId, SubmitError>
    where
        F: FnMut() -> anyhow::Result<T> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.submit(f, WorkOptions::default())
    }
}
