// Integration tests for pool lifecycle, results and worker accounting

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use corral::{
    EventKind, ManualResetEvent, Pool, PoolConfig, PoolEvent, PoolState, SubmitError, WorkError,
    WorkId, WorkOptions, WorkStatus,
};
use common::{eventually, pool, record_events};

#[test]
fn test_submit_wait_fetch() {
    let pool = pool(2);
    let id = pool.submit(|| Ok("done".to_string()), WorkOptions::default()).unwrap();
    assert_eq!(pool.state(), PoolState::Running);
    assert!(pool.wait(&id));

    let result = pool.fetch(&id, false).unwrap();
    assert_eq!(result.status, WorkStatus::Succeed);
    assert_eq!(result.value_as::<String>().map(String::as_str), Some("done"));
    assert!(result.execution_time().is_some());

    // removal is atomic: the second fetch finds nothing
    assert!(pool.fetch(&id, true).is_some());
    assert!(pool.fetch(&id, true).is_none());
    assert_eq!(pool.status(&id), None);
}

#[test]
fn test_generated_ids_are_sequential_and_custom_ids_unique() {
    let pool = pool(2);
    let first = pool.submit_default(|| Ok(())).unwrap();
    let second = pool.submit_default(|| Ok(())).unwrap();
    assert!(second.as_seq().unwrap() > first.as_seq().unwrap());

    let named = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("report"))
        .unwrap();
    assert_eq!(named, WorkId::from("report"));
    pool.wait(&named);
    assert!(matches!(
        pool.submit(|| Ok(()), WorkOptions::default().with_id("report")),
        Err(SubmitError::DuplicateId(id)) if id == named
    ));

    // the id becomes free again once its result is cleared
    assert!(pool.clear_result(&named));
    assert!(pool.submit(|| Ok(()), WorkOptions::default().with_id("report")).is_ok());
    assert!(pool.wait_all());
}

#[test]
fn test_guid_ids() {
    let pool = Pool::new(PoolConfig::default().with_id_kind(corral::IdKind::Guid)).unwrap();
    let id = pool.submit_default(|| Ok(())).unwrap();
    assert!(id.as_guid().is_ok());
    assert!(pool.wait(&id));
}

#[test]
fn test_failures_and_panics_are_recorded() {
    let pool = pool(2);
    let failed = pool
        .submit(|| -> anyhow::Result<()> { anyhow::bail!("no luck") }, WorkOptions::default())
        .unwrap();
    let panicked = pool
        .submit(|| -> anyhow::Result<()> { panic!("boom") }, WorkOptions::default())
        .unwrap();

    let failed = pool.fetch(&failed, false).unwrap();
    assert_eq!(failed.status, WorkStatus::Failed);
    assert_eq!(failed.error.unwrap().to_string(), "no luck");

    let panicked = pool.fetch(&panicked, false).unwrap();
    assert_eq!(panicked.status, WorkStatus::Failed);
    let error = panicked.error.unwrap();
    assert!(matches!(
        error.downcast_ref::<WorkError>(),
        Some(WorkError::Panicked(msg)) if msg == "boom"
    ));

    // the worker survived the panic
    let id = pool.submit_default(|| Ok(1)).unwrap();
    assert!(pool.wait(&id));
}

#[test]
fn test_suspended_pool_queues_until_started() {
    let pool = Pool::new(PoolConfig::default().with_max_threads(2).suspended()).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let ids: Vec<WorkId> = (0..4)
        .map(|_| {
            let ran = Arc::clone(&ran);
            pool.submit_default(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap()
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(pool.state(), PoolState::Suspended);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(pool.queued_len(), 4);
    assert_eq!(pool.waiting_ids().len(), 4);

    assert!(pool.start());
    assert!(pool.wait_many(&ids).into_iter().all(|done| done));
    assert_eq!(ran.load(Ordering::SeqCst), 4);
    assert!(pool.wait_all());
    assert!(pool.is_idle());
}

#[test]
fn test_results_not_retained() {
    let pool = Pool::new(PoolConfig::default().retain_results(false)).unwrap();
    let gate = Arc::new(ManualResetEvent::new(false));
    let id = {
        let gate = Arc::clone(&gate);
        pool.submit_default(move || {
            gate.wait();
            Ok(())
        })
        .unwrap()
    };
    assert_eq!(pool.pending_count(), 1);
    gate.set();
    assert!(pool.wait_all());
    assert!(!pool.wait(&id));
    assert!(pool.fetch(&id, false).is_none());
    assert_eq!(pool.status(&id), None);

    // a per-item override wins over the pool setting
    let kept = pool
        .submit(|| Ok(()), WorkOptions::default().retain_result(true))
        .unwrap();
    assert!(pool.fetch(&kept, false).is_some());
}

#[test]
fn test_fetch_where_and_clear_results() {
    let pool = pool(2);
    for n in 0..6u32 {
        pool.submit_default(move || Ok(n)).unwrap();
    }
    assert!(pool.wait_all());

    let even = pool.fetch_where(|r| r.value_as::<u32>().is_some_and(|n| n % 2 == 0), true);
    assert_eq!(even.len(), 3);
    assert!(pool.fetch_where(|r| r.value_as::<u32>().is_some_and(|n| n % 2 == 0), true).is_empty());
    assert_eq!(pool.clear_results(), 3);
    assert!(pool.fetch_where(|_| true, false).is_empty());
}

#[test]
fn test_dispose_cancels_waiting_work() {
    let pool = Pool::new(PoolConfig::default().suspended()).unwrap();
    let id = pool.submit_default(|| Ok(())).unwrap();
    let canceled = record_events(&pool, &[EventKind::WorkCanceled]);

    pool.dispose();
    assert_eq!(pool.state(), PoolState::Disposed);
    let result = pool.fetch(&id, false).unwrap();
    assert_eq!(result.status, WorkStatus::Canceled);
    assert!(matches!(
        result.error.unwrap().downcast_ref::<WorkError>(),
        Some(WorkError::Disposed)
    ));
    assert_eq!(canceled.lock().len(), 1);

    assert!(matches!(pool.submit_default(|| Ok(())), Err(SubmitError::Disposed)));
    // idempotent
    pool.dispose();
    assert!(pool.wait_all());
}

#[test]
fn test_dispose_stops_running_work_and_joins() {
    let pool = pool(2);
    let id = pool
        .submit_default(|| -> anyhow::Result<()> {
            loop {
                corral::control::sleep(Duration::from_millis(5))?;
            }
        })
        .unwrap();
    assert!(eventually(|| pool.status(&id) == Some(WorkStatus::Running)));

    pool.dispose();
    assert_eq!(pool.fetch(&id, false).unwrap().status, WorkStatus::Stopped);
    assert_eq!(pool.worker_counts().alive, 0);
}

#[test]
fn test_long_running_work_gets_a_dedicated_thread() {
    let pool = pool(1);
    let id = pool
        .submit(
            || Ok(thread::current().name().map(str::to_string)),
            WorkOptions::default().long_running(),
        )
        .unwrap();
    let result = pool.fetch(&id, false).unwrap();
    let name = result.value_as::<Option<String>>().cloned().flatten().unwrap();
    assert!(name.contains("dedicated"), "ran on {name}");
}

#[test]
fn test_worker_counts_respect_max_threads() {
    let pool = pool(2);
    let changes = record_events(&pool, &[EventKind::RunningWorkerCountChanged]);
    let ids: Vec<WorkId> = (0..20)
        .map(|_| {
            pool.submit_default(|| {
                thread::sleep(Duration::from_millis(2));
                Ok(())
            })
            .unwrap()
        })
        .collect();
    assert!(pool.wait_many(&ids).into_iter().all(|done| done));

    let counts = pool.worker_counts();
    assert!(counts.alive <= 2);
    assert_eq!(counts.alive, counts.idle + counts.running);
    for event in changes.lock().iter() {
        if let PoolEvent::RunningWorkerCountChanged { current, .. } = event {
            assert!(*current <= 2);
        }
    }
}

#[test]
fn test_shrinking_retires_idle_workers() {
    let pool = pool(4);
    let gate = Arc::new(ManualResetEvent::new(false));
    let ids: Vec<WorkId> = (0..4)
        .map(|_| {
            let gate = Arc::clone(&gate);
            pool.submit_default(move || {
                gate.wait();
                Ok(())
            })
            .unwrap()
        })
        .collect();
    assert!(eventually(|| pool.running_ids().len() == 4));
    assert_eq!(pool.worker_counts().running, 4);

    gate.set();
    assert!(pool.wait_many(&ids).into_iter().all(|done| done));
    assert!(eventually(|| pool.worker_counts().idle == 4));

    pool.set_max_threads(1).unwrap();
    assert!(eventually(|| pool.worker_counts().alive <= 1));

    let id = pool.submit_default(|| Ok(())).unwrap();
    assert!(pool.wait(&id));
    assert!(pool.worker_counts().alive <= 1);
}

#[test]
fn test_min_threads_survive_keep_alive() {
    let pool = Pool::new(
        PoolConfig::default()
            .with_max_threads(3)
            .with_min_threads(1)
            .with_keep_alive(Duration::from_millis(20)),
    )
    .unwrap();
    let ids: Vec<WorkId> = (0..6)
        .map(|_| {
            pool.submit_default(|| {
                thread::sleep(Duration::from_millis(10));
                Ok(())
            })
            .unwrap()
        })
        .collect();
    assert!(pool.wait_many(&ids).into_iter().all(|done| done));
    assert!(eventually(|| pool.worker_counts().alive == 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pool.worker_counts().alive, 1);
}

#[test]
fn test_resizing_under_load_keeps_counts_consistent() {
    let pool = pool(1);
    let gate = Arc::new(ManualResetEvent::new(false));
    let ids: Vec<WorkId> = (0..6)
        .map(|_| {
            let gate = Arc::clone(&gate);
            pool.submit_default(move || {
                gate.wait();
                Ok(())
            })
            .unwrap()
        })
        .collect();
    assert!(eventually(|| pool.running_ids().len() == 1 && pool.queued_len() == 5));

    let sampling = Arc::new(AtomicBool::new(true));
    let inconsistent = Arc::new(AtomicUsize::new(0));
    let sampler = {
        let pool = pool.clone();
        let sampling = Arc::clone(&sampling);
        let inconsistent = Arc::clone(&inconsistent);
        thread::spawn(move || {
            while sampling.load(Ordering::SeqCst) {
                let counts = pool.worker_counts();
                if counts.idle + counts.running != counts.alive || counts.alive > 4 {
                    inconsistent.fetch_add(1, Ordering::SeqCst);
                }
                thread::yield_now();
            }
        })
    };

    // raising the bound puts queued work on new workers right away
    pool.set_max_threads(4).unwrap();
    assert!(eventually(|| pool.running_ids().len() == 4 && pool.queued_len() == 2));
    assert_eq!(pool.worker_counts().alive, 4);

    pool.set_max_threads(2).unwrap();
    gate.set();
    assert!(pool.wait_many(&ids).into_iter().all(|done| done));
    assert!(eventually(|| pool.worker_counts().alive <= 2));

    sampling.store(false, Ordering::SeqCst);
    sampler.join().unwrap();
    assert_eq!(inconsistent.load(Ordering::SeqCst), 0);
}
