use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::StealableCollection;
use crate::config::QueueDiscipline;

type Lane<T> = Arc<Mutex<VecDeque<T>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum End {
    Front,
    Back,
}

impl QueueDiscipline {
    fn get_end(self) -> End {
        match self {
            QueueDiscipline::Fifo => End::Front,
            QueueDiscipline::Lifo | QueueDiscipline::Deque => End::Back,
        }
    }

    fn steal_end(self) -> End {
        match self {
            QueueDiscipline::Fifo | QueueDiscipline::Deque => End::Front,
            QueueDiscipline::Lifo => End::Back,
        }
    }
}

/// Priority-grouped collection with per-priority locking.
///
/// # Layout
/// - Priority 0 has its own lane. While no item of any other priority is
///   held, `get`/`steal` go straight to it without touching the index.
/// - Every other priority has a lane in `lanes`, located through `sorted`,
///   which lists the non-zero priorities in descending order.
///
/// Lanes are never removed once created, so `sorted` only grows. A priority
/// present in `sorted` whose lane cannot be found is skipped.
///
/// # Thread Safety
/// - One mutex per lane; no operation holds two lane locks at once
/// - `sorted` is read-locked while walking lanes and write-locked only when a
///   new priority value appears (double-checked, so one entry per value)
/// - Counters are raised before an insert and lowered after a removal, so
///   they never underflow
pub struct PriorityCollection<T> {
    discipline: QueueDiscipline,
    zero: Mutex<VecDeque<T>>,
    lanes: DashMap<i32, Lane<T>>,
    sorted: RwLock<Vec<i32>>,
    nonzero_len: AtomicUsize,
    len: AtomicUsize,
}

impl<T> fmt::Debug for PriorityCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityCollection")
            .field("discipline", &self.discipline)
            .field("priorities", &*self.sorted.read())
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send> PriorityCollection<T> {
    pub fn new(discipline: QueueDiscipline) -> Self {
        Self {
            discipline,
            zero: Mutex::new(VecDeque::new()),
            lanes: DashMap::new(),
            sorted: RwLock::new(Vec::new()),
            nonzero_len: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
        }
    }

    pub fn discipline(&self) -> QueueDiscipline {
        self.discipline
    }

    /// Non-zero priorities currently indexed, highest first.
    pub fn priorities(&self) -> Vec<i32> {
        self.sorted.read().clone()
    }

    fn lane(&self, priority: i32) -> Lane<T> {
        let lane = match self.lanes.get(&priority) {
            Some(lane) => Arc::clone(lane.value()),
            None => Arc::clone(
                self.lanes
                    .entry(priority)
                    .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
                    .value(),
            ),
        };
        self.index(priority);
        lane
    }

    fn index(&self, priority: i32) {
        // descending order: an element sorts before `priority` when it is larger
        let search = |sorted: &Vec<i32>| sorted.binary_search_by(|probe| priority.cmp(probe));
        if search(&self.sorted.read()).is_ok() {
            return;
        }
        let mut sorted = self.sorted.write();
        if let Err(pos) = search(&sorted) {
            sorted.insert(pos, priority);
        }
    }

    fn pop(queue: &mut VecDeque<T>, end: End) -> Option<T> {
        match end {
            End::Front => queue.pop_front(),
            End::Back => queue.pop_back(),
        }
    }

    fn take_zero(&self, end: End) -> Option<T> {
        let item = Self::pop(&mut self.zero.lock(), end);
        if item.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }

    fn take_from(&self, priority: i32, end: End) -> Option<T> {
        let lane = match self.lanes.get(&priority) {
            Some(lane) => Arc::clone(lane.value()),
            None => return None,
        };
        let item = Self::pop(&mut lane.lock(), end);
        if item.is_some() {
            self.nonzero_len.fetch_sub(1, Ordering::AcqRel);
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }

    fn take(&self, end: End) -> Option<T> {
        if self.nonzero_len.load(Ordering::Acquire) == 0 {
            return self.take_zero(end);
        }

        let sorted = self.sorted.read();
        let mut zero_checked = false;
        for &priority in sorted.iter() {
            if priority < 0 && !zero_checked {
                zero_checked = true;
                if let Some(item) = self.take_zero(end) {
                    return Some(item);
                }
            }
            if let Some(item) = self.take_from(priority, end) {
                return Some(item);
            }
        }
        drop(sorted);

        if zero_checked {
            None
        } else {
            self.take_zero(end)
        }
    }

    fn discard_from(queue: &mut VecDeque<T>, evictable: &dyn Fn(&T) -> bool) -> Option<T> {
        let index = (0..queue.len()).rev().find(|&i| evictable(&queue[i]))?;
        queue.remove(index)
    }
}

impl<T: Send> StealableCollection<T> for PriorityCollection<T> {
    fn set(&self, item: T, priority: i32) {
        self.len.fetch_add(1, Ordering::AcqRel);
        if priority == 0 {
            self.zero.lock().push_back(item);
            return;
        }
        let lane = self.lane(priority);
        self.nonzero_len.fetch_add(1, Ordering::AcqRel);
        lane.lock().push_back(item);
    }

    fn get(&self) -> Option<T> {
        self.take(self.discipline.get_end())
    }

    fn steal(&self) -> Option<T> {
        self.take(self.discipline.steal_end())
    }

    fn discard_if(&self, evictable: &dyn Fn(&T) -> bool) -> Option<T> {
        // lowest priority first: negatives (ascending), zero, then positives (ascending)
        let ascending: Vec<i32> = self.sorted.read().iter().rev().copied().collect();
        let mut zero_checked = false;
        for priority in ascending {
            if priority > 0 && !zero_checked {
                zero_checked = true;
                if let Some(item) = Self::discard_from(&mut self.zero.lock(), evictable) {
                    self.len.fetch_sub(1, Ordering::AcqRel);
                    return Some(item);
                }
            }
            let lane = match self.lanes.get(&priority) {
                Some(lane) => Arc::clone(lane.value()),
                None => continue,
            };
            let item = Self::discard_from(&mut lane.lock(), evictable);
            if let Some(item) = item {
                self.nonzero_len.fetch_sub(1, Ordering::AcqRel);
                self.len.fetch_sub(1, Ordering::AcqRel);
                return Some(item);
            }
        }
        if !zero_checked {
            if let Some(item) = Self::discard_from(&mut self.zero.lock(), evictable) {
                self.len.fetch_sub(1, Ordering::AcqRel);
                return Some(item);
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn drain_get(c: &PriorityCollection<u32>) -> Vec<u32> {
        std::iter::from_fn(|| c.get()).collect()
    }

    #[test]
    fn test_empty_returns_none() {
        let c: PriorityCollection<u32> = PriorityCollection::new(QueueDiscipline::Fifo);
        assert!(c.get().is_none());
        assert!(c.steal().is_none());
        assert!(c.discard().is_none());
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_higher_priority_first() {
        let c = PriorityCollection::new(QueueDiscipline::Fifo);
        c.set(1, 0);
        c.set(2, -5);
        c.set(3, 10);
        c.set(4, 3);
        assert_eq!(drain_get(&c), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_fifo_orders() {
        let c = PriorityCollection::new(QueueDiscipline::Fifo);
        for i in 0..4 {
            c.set(i, 0);
        }
        assert_eq!(c.steal(), Some(0));
        assert_eq!(c.get(), Some(1));
    }

    #[test]
    fn test_lifo_orders() {
        let c = PriorityCollection::new(QueueDiscipline::Lifo);
        for i in 0..4 {
            c.set(i, 0);
        }
        assert_eq!(c.get(), Some(3));
        assert_eq!(c.steal(), Some(2));
    }

    #[test]
    fn test_deque_orders() {
        let c = PriorityCollection::new(QueueDiscipline::Deque);
        for i in 0..4 {
            c.set(i, 7);
        }
        assert_eq!(c.get(), Some(3));
        assert_eq!(c.steal(), Some(0));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_discard_prefers_lowest_then_newest() {
        let c = PriorityCollection::new(QueueDiscipline::Fifo);
        c.set(1, 5);
        c.set(2, 0);
        c.set(3, 0);
        c.set(4, 5);
        assert_eq!(c.discard(), Some(3));
        assert_eq!(c.discard(), Some(2));
        assert_eq!(c.discard(), Some(4));
        assert_eq!(c.discard(), Some(1));
        assert!(c.discard().is_none());
    }

    #[test]
    fn test_discard_if_skips_rejected_items() {
        let c = PriorityCollection::new(QueueDiscipline::Fifo);
        c.set(10, -1);
        c.set(11, -1);
        c.set(20, 0);
        // odd items are not evictable
        assert_eq!(c.discard_if(&|v| v % 2 == 0), Some(10));
        assert_eq!(c.discard_if(&|v| v % 2 == 0), Some(20));
        assert_eq!(c.discard_if(&|v| v % 2 == 0), None);
        assert_eq!(c.get(), Some(11));
    }

    #[test]
    fn test_zero_lane_fast_path_with_negative_priorities() {
        let c = PriorityCollection::new(QueueDiscipline::Fifo);
        c.set(1, -3);
        c.set(2, 0);
        assert_eq!(c.get(), Some(2));
        assert_eq!(c.get(), Some(1));
        // only the zero lane is populated now
        c.set(3, 0);
        assert_eq!(c.get(), Some(3));
    }

    #[test]
    fn test_concurrent_inserts_index_priority_once() {
        let c = Arc::new(PriorityCollection::new(QueueDiscipline::Fifo));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for i in 0..100u32 {
                        c.set(t * 1000 + i, 42);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(c.priorities(), vec![42]);
        assert_eq!(c.len(), 800);
        assert_eq!(c.drain().len(), 800);
        assert!(c.is_empty());
    }

    #[test]
    fn test_steal_batch_stops_when_empty() {
        let c = PriorityCollection::new(QueueDiscipline::Fifo);
        c.set(1, 0);
        c.set(2, 0);
        assert_eq!(c.steal_batch(5), vec![1, 2]);
    }
}
