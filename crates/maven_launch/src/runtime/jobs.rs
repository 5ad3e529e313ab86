//! Background job queue

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// A unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Schedules work off the calling thread
pub trait JobScheduler: Send + Sync {
    fn schedule(&self, name: &str, job: Job);
}

/// Runs jobs on the tokio blocking pool and tracks how many are pending
#[derive(Debug, Clone)]
pub struct JobQueue {
    handle: Handle,
    pending: Arc<watch::Sender<usize>>,
}

impl JobQueue {
    pub fn new(handle: Handle) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            handle,
            pending: Arc::new(pending),
        }
    }

    /// Queue bound to the runtime of the caller. Panics outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of scheduled jobs that have not finished
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every scheduled job has finished
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }
}

impl JobScheduler for JobQueue {
    fn schedule(&self, name: &str, job: Job) {
        self.pending.send_modify(|pending| *pending += 1);
        let done = PendingGuard(self.pending.clone());
        let name = name.to_string();
        self.handle.spawn_blocking(move || {
            let _done = done;
            log::debug!("Running job '{}'", name);
            job();
        });
    }
}

/// Decrements the pending count even if the job panics
struct PendingGuard(Arc<watch::Sender<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}
