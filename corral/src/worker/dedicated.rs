//! Dedicated threads for long-running items.
//!
//! A long-running item would pin a shared worker for its whole duration, so
//! it gets a thread of its own instead. The thread counts as running while
//! it lives but not against `max_threads`, and it exits after the item.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::pool::PoolInner;
use crate::work::WorkItem;

static NEXT_DEDICATED: AtomicUsize = AtomicUsize::new(0);

/// Join handle of a dedicated thread, kept for dispose.
#[derive(Debug)]
pub(crate) struct DedicatedThread {
    pub handle: JoinHandle<()>,
    pub background: bool,
}

/// Run `item` on a new thread. On spawn failure nothing is counted and the
/// caller still owns the item.
pub(crate) fn spawn_dedicated(pool: &Arc<PoolInner>, item: &Arc<WorkItem>) -> io::Result<()> {
    let Some(reserved) = pool.counts.reserve_dedicated() else {
        return Err(io::Error::other("dedicated thread limit reached"));
    };
    pool.count_changed(Some(reserved));

    let name = format!(
        "{}-dedicated-{}",
        pool.config.thread_name_prefix,
        NEXT_DEDICATED.fetch_add(1, Ordering::Relaxed)
    );
    let mut builder = thread::Builder::new().name(name);
    if let Some(size) = pool.config.thread_stack_size {
        builder = builder.stack_size(size);
    }

    let spawned = {
        let pool = Arc::clone(pool);
        let item = Arc::clone(item);
        builder.spawn(move || {
            debug!(work_id = %item.id, "dedicated thread started");
            pool.execute(item);
            pool.count_changed(pool.counts.release_dedicated());
            trace!("dedicated thread stopped");
        })
    };

    match spawned {
        Ok(handle) => {
            let mut threads = pool.dedicated.lock();
            threads.retain(|thread| !thread.handle.is_finished());
            threads.push(DedicatedThread {
                handle,
                background: item.background,
            });
            Ok(())
        }
        Err(e) => {
            pool.count_changed(pool.counts.release_dedicated());
            Err(e)
        }
    }
}
