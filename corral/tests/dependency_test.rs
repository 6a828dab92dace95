// Dependencies between work items: release, failure propagation and cycles

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use corral::{ManualResetEvent, SubmitError, WorkError, WorkId, WorkOptions, WorkStatus};
use common::{Journal, eventually, pool};

fn step(journal: &Journal, label: &'static str) -> impl FnMut() -> anyhow::Result<()> + Send + 'static {
    let journal = journal.clone();
    move || {
        journal.push(label);
        Ok(())
    }
}

#[test]
fn test_successor_runs_after_all_predecessors() {
    let pool = pool(4);
    let journal = Journal::new();

    // submitted first, held until both predecessors succeed
    let report = pool
        .submit(
            step(&journal, "report"),
            WorkOptions::default()
                .with_id("report")
                .depends_on("extract")
                .depends_on("transform"),
        )
        .unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(pool.status(&report), Some(WorkStatus::Waiting));
    assert_eq!(pool.queued_len(), 0);

    let slow = journal.clone();
    pool.submit(
        move || {
            thread::sleep(Duration::from_millis(30));
            slow.push("extract");
            Ok(())
        },
        WorkOptions::default().with_id("extract"),
    )
    .unwrap();
    pool.submit(step(&journal, "transform"), WorkOptions::default().with_id("transform"))
        .unwrap();

    assert!(pool.wait(&report));
    let entries = journal.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries.last().map(String::as_str), Some("report"));
    assert_eq!(pool.fetch(&report, false).unwrap().status, WorkStatus::Succeed);
}

#[test]
fn test_failure_propagates_transitively() {
    let pool = pool(2);
    let journal = Journal::new();

    let b = pool
        .submit(step(&journal, "b"), WorkOptions::default().with_id("b").depends_on("a"))
        .unwrap();
    let c = pool
        .submit(step(&journal, "c"), WorkOptions::default().with_id("c").depends_on("b"))
        .unwrap();
    pool.submit(
        || -> anyhow::Result<()> { anyhow::bail!("extract failed") },
        WorkOptions::default().with_id("a"),
    )
    .unwrap();

    assert!(pool.wait_all());
    assert!(journal.entries().is_empty());

    let b_result = pool.fetch(&b, false).unwrap();
    assert_eq!(b_result.status, WorkStatus::Failed);
    assert!(matches!(
        b_result.error.unwrap().downcast_ref::<WorkError>(),
        Some(WorkError::DependencyFailed { id, dependency })
            if *id == b && *dependency == WorkId::from("a")
    ));

    let c_result = pool.fetch(&c, false).unwrap();
    assert!(matches!(
        c_result.error.unwrap().downcast_ref::<WorkError>(),
        Some(WorkError::DependencyFailed { dependency, .. }) if *dependency == b
    ));
    // failed dependents never started
    assert!(c_result.started_at.is_none());
}

#[test]
fn test_dependency_on_settled_items() {
    let pool = pool(2);
    let ok = pool.submit(|| Ok(()), WorkOptions::default().with_id("ok")).unwrap();
    let bad = pool
        .submit(
            || -> anyhow::Result<()> { anyhow::bail!("nope") },
            WorkOptions::default().with_id("bad"),
        )
        .unwrap();
    assert!(pool.wait_all());

    let after_ok = pool
        .submit(|| Ok("ran"), WorkOptions::default().depends_on(ok.clone()))
        .unwrap();
    assert_eq!(pool.fetch(&after_ok, false).unwrap().status, WorkStatus::Succeed);

    let after_bad = pool
        .submit(|| Ok("ran"), WorkOptions::default().depends_on(bad.clone()))
        .unwrap();
    let result = pool.fetch(&after_bad, false).unwrap();
    assert_eq!(result.status, WorkStatus::Failed);
    assert!(result.value.is_none());
}

#[test]
fn test_canceled_predecessor_fails_successor() {
    let pool = pool(2);
    let b = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("b").depends_on("a"))
        .unwrap();
    let a = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("a").depends_on("never"))
        .unwrap();

    assert!(pool.cancel(&a));
    assert_eq!(pool.fetch(&a, false).unwrap().status, WorkStatus::Canceled);
    assert_eq!(pool.fetch(&b, false).unwrap().status, WorkStatus::Failed);
    assert!(pool.wait_all());
}

#[test]
fn test_cycles_are_rejected() {
    let pool = pool(2);
    let held = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("b").depends_on("a"))
        .unwrap();

    let err = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("a").depends_on("b"))
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::DependencyCycle { ref id, ref via } if *id == WorkId::from("a") && *via == held
    ));
    // a rejected submission leaves no trace
    assert_eq!(pool.status(&WorkId::from("a")), None);

    let err = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("self").depends_on("self"))
        .unwrap_err();
    assert!(matches!(err, SubmitError::DependencyCycle { .. }));

    assert!(pool.cancel(&held));
    assert!(pool.wait_all());
}

#[test]
fn test_reused_id_does_not_inherit_old_outcome() {
    let pool = pool(2);
    pool.submit(|| Ok(()), WorkOptions::default().with_id("a").retain_result(false))
        .unwrap();
    assert!(pool.wait_all());

    // a fresh item under the same id
    let gate = Arc::new(ManualResetEvent::new(false));
    let a = {
        let gate = Arc::clone(&gate);
        pool.submit(
            move || {
                gate.wait();
                Ok(())
            },
            WorkOptions::default().with_id("a"),
        )
        .unwrap()
    };
    let c = pool
        .submit(|| Ok(()), WorkOptions::default().with_id("c").depends_on("a"))
        .unwrap();
    assert!(eventually(|| pool.status(&a) == Some(WorkStatus::Running)));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(pool.status(&c), Some(WorkStatus::Waiting));

    gate.set();
    assert_eq!(pool.fetch(&c, false).unwrap().status, WorkStatus::Succeed);
    assert!(pool.wait_all());
}

#[test]
fn test_missing_predecessor_holds_until_canceled() {
    let pool = pool(2);
    let orphan = pool
        .submit(|| Ok(()), WorkOptions::default().depends_on("never-submitted"))
        .unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(pool.status(&orphan), Some(WorkStatus::Waiting));
    assert_eq!(pool.pending_count(), 1);

    assert!(pool.cancel(&orphan));
    assert_eq!(pool.fetch(&orphan, false).unwrap().status, WorkStatus::Canceled);
    assert!(pool.wait_all());
}
