use std::collections::HashSet;

use corral_api::WorkId;
use dashmap::DashMap;

/// Group membership, indexed both ways so a dropped item can leave every
/// group it joined.
///
/// The two maps are updated one after the other; a concurrent reader may
/// see an item in one index and not yet in the other.
#[derive(Debug, Default)]
pub(crate) struct GroupRegistry {
    members: DashMap<String, HashSet<WorkId>>,
    memberships: DashMap<WorkId, HashSet<String>>,
}

impl GroupRegistry {
    /// Returns `true` if the item was not already a member.
    pub fn add(&self, group: &str, id: &WorkId) -> bool {
        let added = self
            .members
            .entry(group.to_string())
            .or_default()
            .insert(id.clone());
        if added {
            self.memberships
                .entry(id.clone())
                .or_default()
                .insert(group.to_string());
        }
        added
    }

    pub fn remove(&self, group: &str, id: &WorkId) -> bool {
        let removed = self
            .members
            .get_mut(group)
            .is_some_and(|mut set| set.remove(id));
        if removed {
            self.members.remove_if(group, |_, set| set.is_empty());
            if let Some(mut groups) = self.memberships.get_mut(id) {
                groups.remove(group);
            }
            self.memberships.remove_if(id, |_, groups| groups.is_empty());
        }
        removed
    }

    /// Leave every group.
    pub fn forget(&self, id: &WorkId) {
        let Some((_, groups)) = self.memberships.remove(id) else {
            return;
        };
        for group in groups {
            if let Some(mut set) = self.members.get_mut(&group) {
                set.remove(id);
            }
            self.members.remove_if(&group, |_, set| set.is_empty());
        }
    }

    pub fn members(&self, group: &str) -> Vec<WorkId> {
        self.members
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, group: &str, id: &WorkId) -> bool {
        self.members.get(group).is_some_and(|set| set.contains(id))
    }

    pub fn groups_of(&self, id: &WorkId) -> Vec<String> {
        self.memberships
            .get(id)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }
}
