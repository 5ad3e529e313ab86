//! Process lifecycle events and the bus that delivers them

use super::process::ProcessHandle;
use std::sync::{Arc, Mutex, PoisonError};

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEventKind {
    /// Process was spawned
    Create,
    /// Process terminated
    Terminate,
}

/// Event emitted for a process
#[derive(Debug, Clone)]
pub struct DebugEvent {
    source: Arc<ProcessHandle>,
    kind: DebugEventKind,
}

impl DebugEvent {
    pub fn new(source: Arc<ProcessHandle>, kind: DebugEventKind) -> Self {
        Self { source, kind }
    }

    pub fn create(source: Arc<ProcessHandle>) -> Self {
        Self::new(source, DebugEventKind::Create)
    }

    pub fn terminate(source: Arc<ProcessHandle>) -> Self {
        Self::new(source, DebugEventKind::Terminate)
    }

    pub fn source(&self) -> &Arc<ProcessHandle> {
        &self.source
    }

    pub fn kind(&self) -> DebugEventKind {
        self.kind
    }

    /// True for a terminate event raised by exactly this process handle
    pub fn is_terminate_of(&self, process: &Arc<ProcessHandle>) -> bool {
        self.kind == DebugEventKind::Terminate && Arc::ptr_eq(&self.source, process)
    }
}

/// Receives event sets from a [`DebugEventBus`]
pub trait DebugEventListener: Send + Sync {
    fn handle_debug_events(&self, events: &[DebugEvent]);
}

/// Subscription side of an event bus
pub trait DebugEventBus: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn DebugEventListener>);

    /// Remove a listener, matched by identity
    fn unsubscribe(&self, listener: &dyn DebugEventListener);
}

/// In-process event bus.
///
/// Events are delivered synchronously on the firing thread. The listener list
/// is copied before delivery, so listeners may unsubscribe while handling.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Arc<dyn DebugEventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event set to every current listener
    pub fn fire(&self, events: &[DebugEvent]) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.handle_debug_events(events);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DebugEventBus for EventBus {
    fn subscribe(&self, listener: Arc<dyn DebugEventListener>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if !listeners.iter().any(|l| same_listener(l, listener.as_ref())) {
            listeners.push(listener);
        }
    }

    fn unsubscribe(&self, listener: &dyn DebugEventListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| !same_listener(l, listener));
    }
}

fn same_listener(a: &Arc<dyn DebugEventListener>, b: &dyn DebugEventListener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), b)
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
