// Named groups: membership, bulk control and parent/child relations

mod common;

use std::sync::Arc;
use std::time::Duration;

use corral::{ConfigError, ManualResetEvent, Pool, PoolConfig, WorkId, WorkOptions, WorkStatus, control};
use common::{eventually, pool};

fn in_group(pool: &Pool, group: &str) -> WorkId {
    pool.submit(
        || -> anyhow::Result<()> {
            loop {
                control::sleep(Duration::from_millis(2))?;
            }
        },
        WorkOptions::default().in_group(group),
    )
    .unwrap()
}

#[test]
fn test_membership() {
    let pool = Pool::new(PoolConfig::default().suspended()).unwrap();
    let reports = pool.group("reports");
    let a = pool.submit(|| Ok(()), WorkOptions::default().in_group("reports")).unwrap();
    let b = pool.submit_default(|| Ok(())).unwrap();

    assert_eq!(reports.name(), "reports");
    assert!(reports.contains(&a));
    assert!(!reports.contains(&b));
    assert!(reports.add(&b));
    assert!(!reports.add(&b));
    assert!(!reports.add(&WorkId::from("unknown")));
    assert_eq!(reports.len(), 2);
    assert_eq!(pool.groups_of(&a), vec!["reports".to_string()]);

    assert!(reports.remove(&b));
    assert_eq!(reports.members(), vec![a.clone()]);

    assert_eq!(reports.cancel(), 1);
    assert_eq!(pool.fetch(&a, false).unwrap().status, WorkStatus::Canceled);
    // still a member while the result is retained
    assert!(reports.contains(&a));
    assert!(pool.clear_result(&a));
    assert!(reports.is_empty());
}

#[test]
fn test_membership_ends_with_unretained_items() {
    let pool = pool(2);
    let id = pool
        .submit(
            || Ok(()),
            WorkOptions::default().in_group("transient").retain_result(false),
        )
        .unwrap();
    assert!(pool.wait_all());
    assert!(!pool.group("transient").contains(&id));
    assert!(pool.groups_of(&id).is_empty());
}

#[test]
fn test_group_wait_and_fetch() {
    let pool = pool(4);
    let batch = pool.group("batch");
    for n in 0..5u32 {
        pool.submit(move || Ok(n * 10), WorkOptions::default().in_group("batch"))
            .unwrap();
    }
    assert!(batch.wait());
    let mut values: Vec<u32> = batch
        .fetch(true)
        .iter()
        .filter_map(|result| result.value_as::<u32>().copied())
        .collect();
    values.sort_unstable();
    assert_eq!(values, [0, 10, 20, 30, 40]);
    // fetched with removal, so the members are gone
    assert!(batch.is_empty());
}

#[test]
fn test_pause_and_resume_group() {
    let pool = pool(2);
    let gate = Arc::new(ManualResetEvent::new(false));
    let id = {
        let gate = Arc::clone(&gate);
        pool.submit(
            move || {
                gate.wait();
                control::pause_if_requested()?;
                Ok(())
            },
            WorkOptions::default().in_group("paused"),
        )
        .unwrap()
    };
    let group = pool.group("paused");
    assert!(eventually(|| pool.status(&id) == Some(WorkStatus::Running)));
    assert_eq!(group.pause(), 1);
    gate.set();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(pool.status(&id), Some(WorkStatus::Running));
    assert_eq!(group.resume(), 1);
    assert!(group.wait());
}

#[test]
fn test_stop_cascades_to_child_groups() {
    let pool = pool(4);
    let parent = pool.group("etl");
    parent.set_relation("etl-extract").unwrap();
    pool.group("etl-extract").set_relation("etl-extract-s3").unwrap();

    let own = in_group(&pool, "etl");
    let child = in_group(&pool, "etl-extract");
    let grandchild = in_group(&pool, "etl-extract-s3");
    let unrelated = in_group(&pool, "other");
    assert!(eventually(|| pool.running_ids().len() == 4));

    assert_eq!(parent.stop(), 3);
    for id in [&own, &child, &grandchild] {
        assert_eq!(pool.fetch(id, false).unwrap().status, WorkStatus::Stopped);
    }
    assert_eq!(pool.status(&unrelated), Some(WorkStatus::Running));

    // stopping a child does not reach its parent
    let again = in_group(&pool, "etl");
    let child_again = in_group(&pool, "etl-extract");
    assert!(eventually(|| pool.status(&child_again) == Some(WorkStatus::Running)));
    assert_eq!(pool.group("etl-extract").stop(), 1);
    assert_eq!(pool.fetch(&child_again, false).unwrap().status, WorkStatus::Stopped);
    assert_eq!(pool.status(&again), Some(WorkStatus::Running));

    pool.stop_all();
    assert!(pool.wait_all());
}

#[test]
fn test_relations() {
    let pool = pool(1);
    let a = pool.group("a");
    let b = pool.group("b");
    let c = pool.group("c");

    assert_eq!(a.set_relation("b"), Ok(true));
    assert_eq!(a.set_relation("b"), Ok(false));
    assert_eq!(b.set_relation("c"), Ok(true));
    assert!(matches!(c.set_relation("a"), Err(ConfigError::GroupRelationCycle { .. })));
    assert!(matches!(a.set_relation("a"), Err(ConfigError::SelfRelation(_))));

    assert_eq!(a.children(), vec!["b".to_string()]);
    assert_eq!(c.parents(), vec!["b".to_string()]);

    assert!(b.remove_relation("c"));
    assert!(!b.remove_relation("c"));
    // the cycle is gone, so the edge is allowed now
    assert_eq!(c.set_relation("a"), Ok(true));

    assert_eq!(a.remove_all_relations(), 2);
    assert!(a.children().is_empty() && a.parents().is_empty());

    b.set_relation("c").unwrap();
    pool.reset_group_relations();
    assert!(b.children().is_empty());
}

#[test]
fn test_force_stop_group() {
    let pool = pool(2);
    let id = in_group(&pool, "hard");
    assert!(eventually(|| pool.status(&id) == Some(WorkStatus::Running)));
    assert_eq!(pool.group("hard").force_stop(), 1);
    assert_eq!(pool.fetch(&id, false).unwrap().status, WorkStatus::ForceStopped);
}

#[test]
fn test_add_racing_completion_leaves_no_stale_members() {
    let pool = Pool::new(PoolConfig::default().with_max_threads(4).retain_results(false)).unwrap();
    let late = pool.group("late");
    for _ in 0..200 {
        let id = pool.submit_default(|| Ok(())).unwrap();
        // either joins the live item or finds it already gone
        late.add(&id);
    }
    assert!(pool.wait_all());
    assert!(late.is_empty());
}
