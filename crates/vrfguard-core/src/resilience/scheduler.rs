//! Cancellable deadline tasks.
//!
//! Every timer in the resilience layer (retry delay aside, which is awaited
//! inline) is a [`ScheduledTask`]: a spawned tokio task that sleeps until its
//! deadline and then runs its body. Dropping the handle cancels it.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Run `task` after `delay`. Must be called inside a tokio runtime.
    pub fn after<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Self { handle: Some(handle) }
    }

    /// Like [`ScheduledTask::after`] but returns `None` outside a runtime.
    pub fn try_after<F>(delay: Duration, task: F) -> Option<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::runtime::Handle::try_current().ok()?;
        Some(Self::after(delay, task))
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Release the handle without cancelling. A task that removes its own
    /// handle from shared state calls this so it is not aborted mid-flight.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
