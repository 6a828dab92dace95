//! # Groups
//!
//! Named sets of work items that can be controlled together.
//!
//! Items join a group at submission (`WorkOptions::in_group`) or later
//! through [`Group::add`], and leave it when their record is dropped: result
//! cleared, fetched with removal, or never retained.
//!
//! Groups can be arranged in parent → child relations. Relations form a DAG;
//! an edge that would close a cycle is refused. Stopping a group also stops
//! every group reachable through its child edges.
//!
//! ```rust
//! use corral::{Pool, PoolConfig, WorkOptions};
//!
//! let pool = Pool::new(PoolConfig::default()).unwrap();
//! let nightly = pool.group("nightly");
//! nightly.set_relation("nightly-reports").unwrap();
//!
//! pool.submit(|| Ok(()), WorkOptions::default().in_group("nightly-reports")).unwrap();
//! // stops members of both groups
//! nightly.stop();
//! ```

mod registry;
mod relations;

pub(crate) use registry::GroupRegistry;
pub(crate) use relations::GroupRelations;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use corral_api::{ConfigError, WorkId, WorkResult};
use futures::future;
use tracing::debug;

use crate::pool::Pool;

/// Handle to one named group of a pool. Cheap to clone.
#[derive(Clone)]
pub struct Group {
    name: Arc<str>,
    pool: Pool,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("members", &self.len())
            .finish()
    }
}

impl Group {
    pub(crate) fn new(pool: Pool, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a live or retained item. `false` for unknown ids and existing members.
    pub fn add(&self, id: &WorkId) -> bool {
        let inner = &self.pool.inner;
        if id.is_none() || !inner.contains(id) || !inner.groups.add(&self.name, id) {
            return false;
        }
        // the record may have been dropped between the check and the insert
        if !inner.contains(id) {
            inner.groups.remove(&self.name, id);
            return false;
        }
        true
    }

    pub fn remove(&self, id: &WorkId) -> bool {
        self.pool.inner.groups.remove(&self.name, id)
    }

    pub fn contains(&self, id: &WorkId) -> bool {
        self.pool.inner.groups.contains(&self.name, id)
    }

    pub fn members(&self) -> Vec<WorkId> {
        self.pool.inner.groups.members(&self.name)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn count<I>(&self, ids: I, op: impl Fn(&Pool, &WorkId) -> bool) -> usize
    where
        I: IntoIterator<Item = WorkId>,
    {
        ids.into_iter().filter(|id| op(&self.pool, id)).count()
    }

    /// Pause every member. Returns how many were newly paused.
    pub fn pause(&self) -> usize {
        self.count(self.members(), Pool::pause)
    }

    pub fn resume(&self) -> usize {
        self.count(self.members(), Pool::resume)
    }

    /// Stop the members of this group and of every descendant group.
    pub fn stop(&self) -> usize {
        let descendants = self.children_transitive();
        debug!(group = %self.name, descendants = descendants.len(), "stopping group");
        let mut ids: HashSet<WorkId> = self.members().into_iter().collect();
        for group in &descendants {
            ids.extend(self.pool.inner.groups.members(group));
        }
        self.count(ids, Pool::stop)
    }

    pub fn force_stop(&self) -> usize {
        self.count(self.members(), Pool::force_stop)
    }

    /// Cancel members that have not started.
    pub fn cancel(&self) -> usize {
        self.count(self.members(), Pool::cancel)
    }

    /// Block until every current member finishes. `false` if any wait failed.
    pub fn wait(&self) -> bool {
        self.members()
            .iter()
            .map(|id| self.pool.wait(id))
            .fold(true, |all, done| all && done)
    }

    pub async fn wait_async(&self) -> bool {
        let members = self.members();
        future::join_all(members.iter().map(|id| self.pool.wait_async(id)))
            .await
            .into_iter()
            .all(|done| done)
    }

    /// Wait for the members and collect their retained results.
    pub fn fetch(&self, remove: bool) -> Vec<WorkResult> {
        self.members()
            .iter()
            .filter_map(|id| self.pool.fetch(id, remove))
            .collect()
    }

    /// Make `child` a child of this group.
    ///
    /// # Errors
    ///
    /// [`ConfigError::SelfRelation`] for a self edge and
    /// [`ConfigError::GroupRelationCycle`] if `child` already reaches this group.
    pub fn set_relation(&self, child: &str) -> Result<bool, ConfigError> {
        self.pool.inner.relations.relate(&self.name, child)
    }

    pub fn remove_relation(&self, child: &str) -> bool {
        self.pool.inner.relations.unrelate(&self.name, child)
    }

    /// Remove every relation to or from this group. Returns the number removed.
    pub fn remove_all_relations(&self) -> usize {
        self.pool.inner.relations.unrelate_all(&self.name)
    }

    pub fn children(&self) -> Vec<String> {
        self.pool.inner.relations.children(&self.name)
    }

    pub fn parents(&self) -> Vec<String> {
        self.pool.inner.relations.parents(&self.name)
    }

    fn children_transitive(&self) -> Vec<String> {
        self.pool.inner.relations.descendants(&self.name)
    }
}
