use std::thread;
use std::time::Duration;

use corral::{
    EventKind, Pool, PoolConfig, PoolEvent, RetryOption, WorkOptions, control, logging, priority,
};

// A small ETL run: three stages chained by dependencies, grouped so they can
// be stopped together, with one flaky stage that succeeds on retry.
fn main() -> anyhow::Result<()> {
    logging::init_development();

    let pool = Pool::new(PoolConfig::default().with_max_threads(4))?;
    pool.on(EventKind::PoolIdled, |event| {
        if let PoolEvent::PoolIdled { busy_for } = event {
            println!("pool idle after {busy_for:?}");
        }
        Ok(())
    });
    pool.set_default_callback(|result| {
        println!("{} finished: {:?}", result.id, result.status);
        Ok(())
    });

    let etl = pool.group("etl");

    let extract = pool.submit(
        || {
            for chunk in 0..5 {
                control::stop_if_requested()?;
                control::sleep(Duration::from_millis(10))?;
                println!("extracted chunk {chunk}");
            }
            Ok(5usize)
        },
        WorkOptions::default()
            .with_id("extract")
            .in_group("etl")
            .with_priority(priority::HIGH),
    )?;

    let mut attempts = 0;
    let transform = pool.submit(
        move || {
            attempts += 1;
            if attempts < 2 {
                anyhow::bail!("transient failure on attempt {attempts}");
            }
            Ok(attempts)
        },
        WorkOptions::default()
            .with_id("transform")
            .in_group("etl")
            .depends_on(extract.clone())
            .with_retry(RetryOption::limited(3)),
    )?;

    let load = pool.submit(
        || {
            thread::sleep(Duration::from_millis(5));
            Ok("loaded")
        },
        WorkOptions::default()
            .with_id("load")
            .in_group("etl")
            .depends_on(transform.clone()),
    )?;

    println!("etl members: {:?}", etl.members());
    pool.wait_all();

    if let Some(result) = pool.fetch(&transform, false) {
        println!("transform took {} retries", result.retries);
    }
    if let Some(result) = pool.fetch(&load, true) {
        println!("load returned {:?}", result.value_as::<&str>());
    }

    pool.dispose();
    Ok(())
}
