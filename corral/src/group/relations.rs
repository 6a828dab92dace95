use std::collections::{HashMap, HashSet, VecDeque};

use corral_api::ConfigError;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct RelationState {
    children: HashMap<String, HashSet<String>>,
    parents: HashMap<String, HashSet<String>>,
}

impl RelationState {
    fn link(&mut self, parent: &str, child: &str) -> bool {
        let added = self
            .children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        added
    }

    fn unlink(&mut self, parent: &str, child: &str) -> bool {
        let removed = remove_edge(&mut self.children, parent, child);
        remove_edge(&mut self.parents, child, parent);
        removed
    }
}

/// Names reachable from `start` along `edges`, excluding `start`.
fn walk(edges: &HashMap<String, HashSet<String>>, start: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([start]);
    let mut found = Vec::new();
    while let Some(current) = queue.pop_front() {
        if let Some(next) = edges.get(current) {
            for name in next {
                if name != start && seen.insert(name.as_str()) {
                    found.push(name.clone());
                    queue.push_back(name.as_str());
                }
            }
        }
    }
    found
}

fn remove_edge(edges: &mut HashMap<String, HashSet<String>>, from: &str, to: &str) -> bool {
    let Some(set) = edges.get_mut(from) else {
        return false;
    };
    let removed = set.remove(to);
    if set.is_empty() {
        edges.remove(from);
    }
    removed
}

/// Parent → child relations between groups. Always acyclic.
#[derive(Debug, Default)]
pub(crate) struct GroupRelations {
    state: RwLock<RelationState>,
}

impl GroupRelations {
    /// Add `parent → child`. Returns `false` if the edge already existed.
    ///
    /// Fails before any change if the edge would close a cycle, i.e. when
    /// `parent` is already a descendant of `child`.
    pub fn relate(&self, parent: &str, child: &str) -> Result<bool, ConfigError> {
        if parent == child {
            return Err(ConfigError::SelfRelation(parent.to_string()));
        }
        let mut state = self.state.write();
        let descendants_of_child = walk(&state.children, child);
        if descendants_of_child.iter().any(|name| name == parent) {
            return Err(ConfigError::GroupRelationCycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        Ok(state.link(parent, child))
    }

    pub fn unrelate(&self, parent: &str, child: &str) -> bool {
        self.state.write().unlink(parent, child)
    }

    /// Remove every edge touching `group`. Returns the number removed.
    pub fn unrelate_all(&self, group: &str) -> usize {
        let mut state = self.state.write();
        let children: Vec<String> = state
            .children
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let parents: Vec<String> = state
            .parents
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let mut removed = 0;
        for child in &children {
            removed += usize::from(state.unlink(group, child));
        }
        for parent in &parents {
            removed += usize::from(state.unlink(parent, group));
        }
        removed
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        state.children.clear();
        state.parents.clear();
    }

    pub fn children(&self, group: &str) -> Vec<String> {
        sorted(self.state.read().children.get(group))
    }

    pub fn parents(&self, group: &str) -> Vec<String> {
        sorted(self.state.read().parents.get(group))
    }

    /// Every group reachable through child edges, excluding `group` itself.
    pub fn descendants(&self, group: &str) -> Vec<String> {
        walk(&self.state.read().children, group)
    }
}

fn sorted(set: Option<&HashSet<String>>) -> Vec<String> {
    let mut names: Vec<String> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
    names.sort();
    names
}
