//! Handles to spawned processes

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

/// Process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is running
    Running,
    /// Process has terminated with exit code (None if killed by a signal)
    Terminated(Option<i32>),
}

impl ProcessStatus {
    /// Check if process has terminated
    pub fn is_terminated(&self) -> bool {
        matches!(self, ProcessStatus::Terminated(_))
    }
}

/// Shared handle to a spawned process.
///
/// Status changes happen under the handle's lifecycle lock, so callers that
/// check [`ProcessHandle::is_terminated`] inside [`ProcessHandle::synchronized`]
/// cannot miss a termination that happens concurrently.
#[derive(Debug)]
pub struct ProcessHandle {
    id: u64,
    label: String,
    pid: Option<u32>,
    status: Mutex<ProcessStatus>,
    /// Set once the termination has been published to event listeners
    announced: watch::Sender<bool>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Released when the process terminates
    retained: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl ProcessHandle {
    /// Create a handle for a running process
    pub fn new(label: impl Into<String>) -> Self {
        let (announced, _) = watch::channel(false);
        Self {
            id: NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            pid: None,
            status: Mutex::new(ProcessStatus::Running),
            announced,
            kill_tx: Mutex::new(None),
            retained: Mutex::new(Vec::new()),
        }
    }

    /// Attach the OS process id
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attach a channel used to request termination
    pub fn with_kill_switch(self, kill_tx: oneshot::Sender<()>) -> Self {
        *lock(&self.kill_tx) = Some(kill_tx);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn status(&self) -> ProcessStatus {
        *lock(&self.status)
    }

    pub fn is_terminated(&self) -> bool {
        self.status().is_terminated()
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status() {
            ProcessStatus::Terminated(code) => code,
            ProcessStatus::Running => None,
        }
    }

    /// Run `f` with the lifecycle lock held, passing the current status
    pub fn synchronized<R>(&self, f: impl FnOnce(ProcessStatus) -> R) -> R {
        let status = lock(&self.status);
        f(*status)
    }

    /// Record termination. Returns false if the process had already terminated.
    pub fn mark_terminated(&self, code: Option<i32>) -> bool {
        let mut status = lock(&self.status);
        if status.is_terminated() {
            return false;
        }
        *status = ProcessStatus::Terminated(code);
        let released = std::mem::take(&mut *lock(&self.retained));
        drop(status);

        log::debug!("[{}] Process terminated with code: {:?}", self.label, code);
        drop(released);
        true
    }

    /// Keep `resource` alive until the process terminates, e.g. a temporary
    /// file the process reads. Dropped immediately if it already has.
    pub fn retain_until_terminated<T: Send + 'static>(&self, resource: T) {
        let status = lock(&self.status);
        if status.is_terminated() {
            drop(status);
            drop(resource);
            return;
        }
        lock(&self.retained).push(Box::new(resource));
    }

    /// Mark the termination as published to event listeners
    pub fn announce_terminated(&self) {
        self.announced.send_replace(true);
    }

    /// Wait until the termination has been published to event listeners
    pub async fn wait_announced(&self) {
        let mut rx = self.announced.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|announced| *announced).await;
    }

    /// Ask the runner to kill the process. Returns false if no request could be sent.
    pub fn request_terminate(&self) -> bool {
        match lock(&self.kill_tx).take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
