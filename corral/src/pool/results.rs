//! Retained results: fetch, filtered fetch and clearing.
//!
//! Removing a record also drops the item's group membership and its
//! settlement in the dependency graph, so later dependents of that id wait
//! for a new item with the same id.

use corral_api::{WorkId, WorkResult};

use super::{Pool, PoolInner};

impl PoolInner {
    fn take_result(&self, id: &WorkId) -> Option<WorkResult> {
        let (_, result) = self.results.remove(id)?;
        self.drop_record(id);
        Some(result)
    }

    fn drop_record(&self, id: &WorkId) {
        self.groups.forget(id);
        self.graph.forget(id);
    }
}

impl Pool {
    /// Wait for the item, then return its result; `remove` takes it out of the store.
    ///
    /// `None` for unknown ids and for items that do not retain their result.
    pub fn fetch(&self, id: &WorkId, remove: bool) -> Option<WorkResult> {
        if !self.wait(id) {
            return None;
        }
        self.read_result(id, remove)
    }

    pub fn fetch_many(&self, ids: &[WorkId], remove: bool) -> Vec<Option<WorkResult>> {
        ids.iter().map(|id| self.fetch(id, remove)).collect()
    }

    /// Every stored result matching `pred`, without waiting.
    ///
    /// With `remove`, each record is taken atomically, so concurrent callers
    /// never both receive the same result.
    pub fn fetch_where<P>(&self, pred: P, remove: bool) -> Vec<WorkResult>
    where
        P: Fn(&WorkResult) -> bool,
    {
        let inner = &self.inner;
        if !remove {
            return inner
                .results
                .iter()
                .filter(|entry| pred(entry.value()))
                .map(|entry| entry.value().clone())
                .collect();
        }
        let matching: Vec<WorkId> = inner
            .results
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        matching
            .into_iter()
            .filter_map(|id| {
                let (_, result) = inner.results.remove_if(&id, |_, result| pred(result))?;
                inner.drop_record(&id);
                Some(result)
            })
            .collect()
    }

    /// Async counterpart of [`fetch`](Self::fetch).
    pub async fn fetch_async(&self, id: &WorkId, remove: bool) -> Option<WorkResult> {
        if !self.wait_async(id).await {
            return None;
        }
        self.read_result(id, remove)
    }

    /// Drop one stored result. Returns whether it existed.
    pub fn clear_result(&self, id: &WorkId) -> bool {
        self.inner.take_result(id).is_some()
    }

    /// Drop every stored result. Returns how many were removed.
    pub fn clear_results(&self) -> usize {
        let ids: Vec<WorkId> = self
            .inner
            .results
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter()
            .filter(|id| self.inner.take_result(id).is_some())
            .count()
    }

    fn read_result(&self, id: &WorkId, remove: bool) -> Option<WorkResult> {
        if remove {
            self.inner.take_result(id)
        } else {
            self.inner.results.get(id).map(|entry| entry.value().clone())
        }
    }
}
