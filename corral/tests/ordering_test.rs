// Queue discipline and priority ordering on a single worker

mod common;

use corral::{Pool, QueueDiscipline, WorkOptions};
use common::{Journal, single_worker};

fn submit_labeled(pool: &Pool, journal: &Journal, label: &str, priority: i32) {
    let journal = journal.clone();
    let label = label.to_string();
    pool.submit(
        move || {
            journal.push(label.clone());
            Ok(())
        },
        WorkOptions::default().with_priority(priority),
    )
    .unwrap();
}

fn run_order(discipline: QueueDiscipline, items: &[(&str, i32)]) -> Vec<String> {
    let pool = single_worker(discipline);
    let journal = Journal::new();
    for (label, priority) in items {
        submit_labeled(&pool, &journal, label, *priority);
    }
    assert_eq!(pool.queued_len(), items.len());
    assert!(pool.start());
    assert!(pool.wait_all());
    journal.entries()
}

#[test]
fn test_fifo_runs_oldest_first() {
    let order = run_order(QueueDiscipline::Fifo, &[("a", 0), ("b", 0), ("c", 0)]);
    assert_eq!(order, ["a", "b", "c"]);
}

#[test]
fn test_lifo_runs_newest_first() {
    let order = run_order(QueueDiscipline::Lifo, &[("a", 0), ("b", 0), ("c", 0)]);
    assert_eq!(order, ["c", "b", "a"]);
}

#[test]
fn test_deque_owner_takes_newest() {
    let order = run_order(QueueDiscipline::Deque, &[("a", 0), ("b", 0), ("c", 0)]);
    assert_eq!(order, ["c", "b", "a"]);
}

#[test]
fn test_priority_beats_arrival_order() {
    let order = run_order(
        QueueDiscipline::Fifo,
        &[("low", -5), ("mid-1", 0), ("high", 10), ("mid-2", 0)],
    );
    assert_eq!(order, ["high", "mid-1", "mid-2", "low"]);
}

#[test]
fn test_priority_with_lifo_ties() {
    let order = run_order(
        QueueDiscipline::Lifo,
        &[("a", 1), ("b", 1), ("c", 2), ("d", 0)],
    );
    assert_eq!(order, ["c", "b", "a", "d"]);
}
