//! Blocking and async waits on single items and on the whole pool.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use corral_api::{PoolState, WaitError, WorkId};
use futures::future;

use super::{Pool, PoolInner};
use crate::signal::CancelSignal;
use crate::work::WorkItem;

/// How often a blocking wait re-checks cancellation and disposal.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Options for [`Pool::wait_with`].
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Ends the wait early with [`WaitError::Canceled`].
    pub cancel: Option<CancelSignal>,
    /// Run queued items on the waiting thread instead of just blocking.
    pub help: bool,
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn helping(mut self) -> Self {
        self.help = true;
        self
    }
}

enum Target {
    Live(Arc<WorkItem>),
    Settled(bool),
}

impl PoolInner {
    fn wait_target(&self, id: &WorkId) -> Target {
        match self.item(id) {
            Some(item) => Target::Live(item),
            // finished items leave the registry after their result is stored
            None => Target::Settled(self.results.contains_key(id)),
        }
    }

    fn is_canceled(cancel: Option<&CancelSignal>) -> bool {
        cancel.is_some_and(CancelSignal::is_canceled)
    }

    /// Run one item from the global queue on this thread.
    fn help_once(self: &Arc<Self>) -> bool {
        if self.state() != PoolState::Running {
            return false;
        }
        match self.global.get() {
            Some(item) => {
                self.execute(item);
                true
            }
            None => false,
        }
    }
}

impl Pool {
    /// Block until the item finishes. `false` for unknown ids, or if the pool
    /// is disposed while the item is still running.
    ///
    /// Items submitted without result retention can only be waited on while
    /// they are live.
    pub fn wait(&self, id: &WorkId) -> bool {
        self.wait_with(id, WaitOptions::default()).unwrap_or(false)
    }

    pub fn wait_many(&self, ids: &[WorkId]) -> Vec<bool> {
        ids.iter().map(|id| self.wait(id)).collect()
    }

    /// Block until the item finishes, honoring cancellation and helping.
    ///
    /// # Errors
    ///
    /// [`WaitError::Canceled`] when `options.cancel` fires first and
    /// [`WaitError::Disposed`] when the pool is disposed with the item unfinished.
    pub fn wait_with(&self, id: &WorkId, options: WaitOptions) -> Result<bool, WaitError> {
        let item = match self.inner.wait_target(id) {
            Target::Live(item) => item,
            Target::Settled(known) => return Ok(known),
        };
        let cancel = options.cancel.as_ref();
        loop {
            if item.is_done() {
                return Ok(true);
            }
            if PoolInner::is_canceled(cancel) {
                return Err(WaitError::Canceled);
            }
            if self.inner.disposed.is_set() {
                // dispose finishes waiting items before it signals
                return if item.is_done() {
                    Ok(true)
                } else {
                    Err(WaitError::Disposed)
                };
            }
            if options.help && self.inner.help_once() {
                continue;
            }
            item.wait_done_timeout(POLL_INTERVAL);
        }
    }

    /// Block until the pool is idle. `false` if it was disposed with work still in flight.
    pub fn wait_all(&self) -> bool {
        self.wait_all_with(WaitOptions::default()).is_ok()
    }

    /// Block until the pool is idle, honoring cancellation and helping.
    pub fn wait_all_with(&self, options: WaitOptions) -> Result<(), WaitError> {
        let inner = &self.inner;
        let cancel = options.cancel.as_ref();
        loop {
            if inner.pending.load(Ordering::SeqCst) == 0 && inner.idle.is_set() {
                return Ok(());
            }
            if PoolInner::is_canceled(cancel) {
                return Err(WaitError::Canceled);
            }
            if inner.disposed.is_set() && inner.idle.is_set() {
                return Err(WaitError::Disposed);
            }
            if options.help && inner.help_once() {
                continue;
            }
            inner.idle.wait_timeout(POLL_INTERVAL);
        }
    }

    /// Resolves when the item finishes. `false` for unknown ids, or if the
    /// pool is disposed while the item is still running.
    pub async fn wait_async(&self, id: &WorkId) -> bool {
        self.wait_async_with(id, None).await.unwrap_or(false)
    }

    /// Async counterpart of [`wait_with`](Self::wait_with) without helping.
    pub async fn wait_async_with(
        &self,
        id: &WorkId,
        cancel: Option<CancelSignal>,
    ) -> Result<bool, WaitError> {
        let item = match self.inner.wait_target(id) {
            Target::Live(item) => item,
            Target::Settled(known) => return Ok(known),
        };
        let cancel = cancel.unwrap_or_default();
        tokio::select! {
            biased;
            _ = item.wait_done_async() => Ok(true),
            _ = cancel.canceled() => Err(WaitError::Canceled),
            _ = self.inner.disposed_async.wait() => {
                if item.is_done() {
                    Ok(true)
                } else {
                    Err(WaitError::Disposed)
                }
            }
        }
    }

    pub async fn wait_many_async(&self, ids: &[WorkId]) -> Vec<bool> {
        future::join_all(ids.iter().map(|id| self.wait_async(id))).await
    }

    /// Resolves when the pool is idle.
    pub async fn wait_all_async(&self) {
        self.inner.idle_async.wait().await
    }
}
