//! # Dependency Graph
//!
//! Tracks "successor depends on predecessor" edges between work items.
//!
//! An item declared with dependencies is *held*: it stays `Waiting` without
//! being queued until every predecessor has settled. Settling a predecessor
//! as successful releases the successors whose last open dependency it was;
//! settling it as unsuccessful fails its direct successors, which the caller
//! then settles in turn so the failure propagates transitively.
//!
//! Predecessors that are unknown when a successor is submitted stay open
//! until an item with that id settles. A successor whose predecessor never
//! arrives stays held until it is canceled.

use std::collections::{HashMap, HashSet, VecDeque};

use corral_api::{SubmitError, WorkId};
use parking_lot::Mutex;

/// Result of registering an item's dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Admission {
    /// No open dependency; the item can be queued.
    Ready,
    /// Held until its open dependencies settle.
    Held,
    /// A dependency already settled unsuccessfully.
    Failed { dependency: WorkId },
}

/// Items affected by settling one item.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Settlement {
    pub released: Vec<WorkId>,
    pub failed: Vec<WorkId>,
}

#[derive(Debug, Default)]
struct GraphState {
    /// Open predecessors of each held item.
    open: HashMap<WorkId, HashSet<WorkId>>,
    /// Held successors of each predecessor.
    successors: HashMap<WorkId, HashSet<WorkId>>,
    /// Settled items and whether they succeeded.
    settled: HashMap<WorkId, bool>,
}

impl GraphState {
    /// Is `target` reachable from `from` by following depends-on edges?
    fn reaches(&self, from: &WorkId, target: &WorkId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(preds) = self.open.get(current) {
                queue.extend(preds.iter());
            }
        }
        false
    }

    fn detach(&mut self, id: &WorkId) {
        if let Some(preds) = self.open.remove(id) {
            for pred in preds {
                if let Some(succ) = self.successors.get_mut(&pred) {
                    succ.remove(id);
                    if succ.is_empty() {
                        self.successors.remove(&pred);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    state: Mutex<GraphState>,
}

impl DependencyGraph {
    /// Register `id` with its predecessors. Rejects self-dependencies and
    /// cycles without changing any state.
    pub fn add(&self, id: &WorkId, dependencies: &HashSet<WorkId>) -> Result<Admission, SubmitError> {
        if dependencies.is_empty() {
            return Ok(Admission::Ready);
        }
        let mut state = self.state.lock();

        for pred in dependencies {
            if pred == id || state.reaches(pred, id) {
                return Err(SubmitError::DependencyCycle {
                    id: id.clone(),
                    via: pred.clone(),
                });
            }
        }

        let mut open = HashSet::new();
        for pred in dependencies {
            match state.settled.get(pred) {
                Some(true) => {}
                Some(false) => {
                    return Ok(Admission::Failed {
                        dependency: pred.clone(),
                    });
                }
                None => {
                    open.insert(pred.clone());
                }
            }
        }
        if open.is_empty() {
            return Ok(Admission::Ready);
        }

        for pred in &open {
            state
                .successors
                .entry(pred.clone())
                .or_default()
                .insert(id.clone());
        }
        state.open.insert(id.clone(), open);
        Ok(Admission::Held)
    }

    /// Resolve the held items waiting on `id`. With `remember`, the outcome is
    /// kept so later dependents of `id` resolve against it until [`forget`](Self::forget).
    pub fn settle(&self, id: &WorkId, success: bool, remember: bool) -> Settlement {
        let mut state = self.state.lock();
        if remember {
            state.settled.insert(id.clone(), success);
        } else {
            state.settled.remove(id);
        }
        state.detach(id);

        let mut settlement = Settlement::default();
        let Some(successors) = state.successors.remove(id) else {
            return settlement;
        };
        for succ in successors {
            if success {
                let now_ready = match state.open.get_mut(&succ) {
                    Some(open) => {
                        open.remove(id);
                        open.is_empty()
                    }
                    None => false,
                };
                if now_ready {
                    state.open.remove(&succ);
                    settlement.released.push(succ);
                }
            } else {
                state.detach(&succ);
                settlement.failed.push(succ);
            }
        }
        settlement
    }

    /// Undo an `add` for an item that was never admitted.
    pub fn withdraw(&self, id: &WorkId) {
        self.state.lock().detach(id);
    }

    /// Drop the settlement record of `id`.
    pub fn forget(&self, id: &WorkId) {
        self.state.lock().settled.remove(id);
    }

    #[cfg(test)]
    pub fn is_held(&self, id: &WorkId) -> bool {
        self.state.lock().open.contains_key(id)
    }
}
