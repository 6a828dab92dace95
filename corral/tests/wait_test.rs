// Blocking and async waits: cancellation, helping and disposal

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use corral::{
    CancelSignal, ManualResetEvent, Pool, PoolConfig, WaitError, WaitOptions, WorkId, WorkStatus,
};
use common::{eventually, pool};

/// Single-worker pool whose only worker is parked on `gate`.
fn blocked_pool(config: PoolConfig) -> (Pool, Arc<ManualResetEvent>, WorkId) {
    corral::logging::init_for_tests();
    let pool = Pool::new(config.with_max_threads(1)).unwrap();
    let gate = Arc::new(ManualResetEvent::new(false));
    let blocker = {
        let gate = Arc::clone(&gate);
        pool.submit_default(move || {
            gate.wait();
            Ok(())
        })
        .unwrap()
    };
    assert!(eventually(|| pool.status(&blocker) == Some(WorkStatus::Running)));
    (pool, gate, blocker)
}

#[test]
fn test_unknown_ids_are_not_waited_on() {
    let pool = pool(1);
    assert!(!pool.wait(&WorkId::from("missing")));
    assert_eq!(pool.wait_with(&WorkId::from("missing"), WaitOptions::new()), Ok(false));
}

#[test]
fn test_wait_with_cancel() {
    let (pool, gate, blocker) = blocked_pool(PoolConfig::default());
    let cancel = CancelSignal::new();
    let canceler = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        })
    };

    let outcome = pool.wait_with(&blocker, WaitOptions::new().with_cancel(cancel.clone()));
    assert_eq!(outcome, Err(WaitError::Canceled));
    assert_eq!(
        pool.wait_all_with(WaitOptions::new().with_cancel(cancel)),
        Err(WaitError::Canceled)
    );
    canceler.join().unwrap();

    // canceling the wait leaves the item alone
    assert_eq!(pool.status(&blocker), Some(WorkStatus::Running));
    gate.set();
    assert!(pool.wait(&blocker));
}

#[test]
fn test_helping_wait_runs_queued_work_inline() {
    let (pool, gate, _blocker) = blocked_pool(PoolConfig::default());
    let queued = pool.submit_default(|| Ok(thread::current().id())).unwrap();
    assert_eq!(pool.queued_len(), 1);

    assert_eq!(pool.wait_with(&queued, WaitOptions::new().helping()), Ok(true));
    let result = pool.fetch(&queued, false).unwrap();
    assert_eq!(result.value_as::<thread::ThreadId>(), Some(&thread::current().id()));

    gate.set();
    assert!(pool.wait_all());
}

#[test]
fn test_wait_reports_disposal() {
    let (pool, gate, blocker) = blocked_pool(PoolConfig::default().join_on_dispose(false));
    let disposer = {
        let pool = pool.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            pool.dispose();
        })
    };

    assert_eq!(
        pool.wait_with(&blocker, WaitOptions::new()),
        Err(WaitError::Disposed)
    );
    disposer.join().unwrap();
    assert!(!pool.wait(&blocker));
    gate.set();
}

#[tokio::test]
async fn test_wait_async() {
    let pool = pool(2);
    let ids: Vec<WorkId> = (0..4)
        .map(|n| {
            pool.submit_default(move || {
                thread::sleep(Duration::from_millis(5));
                Ok(n)
            })
            .unwrap()
        })
        .collect();

    assert!(pool.wait_async(&ids[0]).await);
    assert!(pool.wait_many_async(&ids).await.into_iter().all(|done| done));
    pool.wait_all_async().await;
    assert!(pool.is_idle());

    let result = pool.fetch_async(&ids[3], true).await.unwrap();
    assert_eq!(result.value_as::<i32>(), Some(&3));
    assert!(!pool.wait_async(&ids[3]).await);
}

#[tokio::test]
async fn test_wait_async_cancel() {
    let (pool, gate, blocker) = blocked_pool(PoolConfig::default());
    let cancel = CancelSignal::new();
    cancel.cancel();
    assert_eq!(
        pool.wait_async_with(&blocker, Some(cancel)).await,
        Err(WaitError::Canceled)
    );
    gate.set();
    assert!(pool.wait_async(&blocker).await);
}

#[tokio::test]
async fn test_group_wait_async() {
    let pool = pool(2);
    for _ in 0..3 {
        pool.submit(|| Ok(()), corral::WorkOptions::default().in_group("async"))
            .unwrap();
    }
    assert!(pool.group("async").wait_async().await);
}
