//! # Stealable Collections
//!
//! Containers that feed workers. Each worker owns one collection as its
//! local queue and the pool owns one more as the shared backlog.
//!
//! ## Key Concepts
//! - `get`: the owning worker takes its next item
//! - `steal`: a different worker takes an item on the owner's behalf
//! - `discard`: an item is evicted under backpressure
//!
//! Items are grouped by integer priority. `get` and `steal` prefer the
//! highest priority; `discard` prefers the lowest priority and, within it,
//! the most recently inserted item. Ordering inside one priority depends on
//! the [`QueueDiscipline`](crate::config::QueueDiscipline).
//!
//! Every removal returns `None` rather than failing when nothing suitable is
//! present.

mod priority;

pub use priority::PriorityCollection;

use crate::config::QueueDiscipline;

/// Concurrent priority container with owner/thief/evictor access paths.
pub trait StealableCollection<T>: Send + Sync {
    /// Insert an item at the given priority.
    fn set(&self, item: T, priority: i32);

    /// Remove the next item for the owning worker.
    fn get(&self) -> Option<T>;

    /// Remove an item on behalf of another worker.
    fn steal(&self) -> Option<T>;

    /// Remove the eviction candidate the predicate accepts, skipping the
    /// items it rejects (they stay in place).
    fn discard_if(&self, evictable: &dyn Fn(&T) -> bool) -> Option<T>;

    /// Number of items currently held (snapshot).
    fn len(&self) -> usize;

    /// Remove the eviction candidate.
    fn discard(&self) -> Option<T> {
        self.discard_if(&|_| true)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Steal up to `max` items in steal order.
    fn steal_batch(&self, max: usize) -> Vec<T> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.steal() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Remove everything, in `get` order.
    fn drain(&self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len());
        while let Some(item) = self.get() {
            items.push(item);
        }
        items
    }
}

/// Build the collection used for the given discipline.
pub fn for_discipline<T: Send + 'static>(
    discipline: QueueDiscipline,
) -> Box<dyn StealableCollection<T>> {
    Box::new(PriorityCollection::new(discipline))
}
