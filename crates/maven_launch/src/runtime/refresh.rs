//! Workspace refresh after a launched process terminates

use super::events::{DebugEvent, DebugEventBus, DebugEventListener};
use super::jobs::JobScheduler;
use super::process::ProcessHandle;
use crate::config::{keys, substitute_or_raw, LaunchConfiguration, VariableSubstitution};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Refreshes workspace resources affected by a launch
pub trait WorkspaceRefresher: Send + Sync {
    fn refresh_resources(&self, config: &LaunchConfiguration) -> Result<(), RefreshError>;
}

/// Refresh coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Created, not started
    Idle,
    /// Listening for the termination event
    Armed,
    /// Refresh dispatched (terminal)
    Fired,
}

/// Refreshes resources as specified by a launch configuration, when the
/// associated process terminates.
///
/// The refresh is dispatched exactly once: immediately if the process has
/// already terminated when [`ResourceRefresher::start_background_refresh`]
/// runs, otherwise on the first terminate event for that process.
pub struct ResourceRefresher {
    config: Arc<LaunchConfiguration>,
    process: Arc<ProcessHandle>,
    bus: Arc<dyn DebugEventBus>,
    jobs: Arc<dyn JobScheduler>,
    refresher: Arc<dyn WorkspaceRefresher>,
    state: Mutex<RefreshState>,
    me: Weak<ResourceRefresher>,
}

impl ResourceRefresher {
    pub fn new(
        config: Arc<LaunchConfiguration>,
        process: Arc<ProcessHandle>,
        bus: Arc<dyn DebugEventBus>,
        jobs: Arc<dyn JobScheduler>,
        refresher: Arc<dyn WorkspaceRefresher>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            config,
            process,
            bus,
            jobs,
            refresher,
            state: Mutex::new(RefreshState::Idle),
            me: me.clone(),
        })
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh now if the process has terminated, otherwise wait for its
    /// terminate event
    pub fn start_background_refresh(&self) {
        // Holding the process lock keeps termination from slipping in between
        // the check and the subscription.
        self.process.synchronized(|status| {
            if status.is_terminated() {
                self.fire();
                return;
            }

            if !self.transition(RefreshState::Idle, RefreshState::Armed) {
                log::warn!("[{}] Refresh already started", self.process.label());
                return;
            }
            if let Some(me) = self.me.upgrade() {
                self.bus.subscribe(me);
            }
        });
    }

    fn transition(&self, from: RefreshState, to: RefreshState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    /// Move to `Fired` and dispatch, unless already fired
    fn fire(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == RefreshState::Fired {
                return;
            }
            *state = RefreshState::Fired;
        }
        self.refresh();
    }

    /// Submit a job to do the refresh
    fn refresh(&self) {
        let config = self.config.clone();
        let refresher = self.refresher.clone();
        let label = self.process.label().to_string();
        self.jobs.schedule(
            "Refreshing resources...",
            Box::new(move || {
                if let Err(e) = refresher.refresh_resources(&config) {
                    log::error!("[{}] Failed to refresh resources: {}", label, e);
                }
            }),
        );
    }
}

impl DebugEventListener for ResourceRefresher {
    fn handle_debug_events(&self, events: &[DebugEvent]) {
        if events.iter().any(|event| event.is_terminate_of(&self.process)) {
            self.bus.unsubscribe(self);
            self.fire();
        }
    }
}

impl std::fmt::Debug for ResourceRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRefresher")
            .field("config", &self.config.name())
            .field("process", &self.process.label())
            .field("state", &self.state())
            .finish()
    }
}

/// Changes found by a directory refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub scanned: usize,
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

/// Refreshes the directory named by the `REFRESH_SCOPE` attribute.
///
/// Supported scopes are `${workspace}`, `${project}` (the POM directory) and
/// `${resource:<path>}`. A snapshot of modification times is kept per scope
/// so later refreshes report what the build added, changed or removed.
pub struct DirectoryRefresher {
    workspace_root: Option<PathBuf>,
    substitution: Arc<dyn VariableSubstitution>,
    snapshots: Mutex<HashMap<PathBuf, HashMap<PathBuf, SystemTime>>>,
}

impl DirectoryRefresher {
    pub fn new(workspace_root: Option<PathBuf>, substitution: Arc<dyn VariableSubstitution>) -> Self {
        Self {
            workspace_root,
            substitution,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Directory to refresh for a configuration, None if it declares no scope
    pub fn refresh_scope(&self, config: &LaunchConfiguration) -> Result<Option<PathBuf>, RefreshError> {
        let Some(scope) = config.string_opt(keys::REFRESH_SCOPE) else {
            return Ok(None);
        };
        let scope = scope.trim();

        if scope.is_empty() {
            return Ok(None);
        }
        if scope == "${workspace}" {
            return self
                .workspace_root
                .clone()
                .map(Some)
                .ok_or(RefreshError::MissingWorkspace);
        }
        if scope == "${project}" {
            return config
                .string_opt(keys::POM_DIR)
                .map(|dir| Some(PathBuf::from(substitute_or_raw(self.substitution.as_ref(), &dir))))
                .ok_or(RefreshError::MissingProject);
        }
        if let Some(path) = scope
            .strip_prefix("${resource:")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            return Ok(Some(PathBuf::from(substitute_or_raw(self.substitution.as_ref(), path))));
        }

        Err(RefreshError::InvalidScope(scope.to_string()))
    }

    /// Rescan `root` and compare it with the previous snapshot
    pub fn refresh_path(&self, root: &Path) -> Result<RefreshSummary, RefreshError> {
        let mut current = HashMap::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| RefreshError::Scan {
                path: root.display().to_string(),
                source: e,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            current.insert(entry.into_path(), modified);
        }

        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = snapshots.remove(root).unwrap_or_default();

        let mut summary = RefreshSummary {
            scanned: current.len(),
            ..Default::default()
        };
        for (path, modified) in &current {
            match previous.get(path) {
                None => summary.added += 1,
                Some(before) if before != modified => summary.changed += 1,
                Some(_) => {}
            }
        }
        summary.removed = previous.keys().filter(|p| !current.contains_key(*p)).count();

        snapshots.insert(root.to_path_buf(), current);
        Ok(summary)
    }
}

impl WorkspaceRefresher for DirectoryRefresher {
    fn refresh_resources(&self, config: &LaunchConfiguration) -> Result<(), RefreshError> {
        let Some(root) = self.refresh_scope(config)? else {
            log::debug!("[{}] No refresh scope configured", config.name());
            return Ok(());
        };

        let summary = self.refresh_path(&root)?;
        log::info!(
            "Refreshed {} resources under {} ({} added, {} changed, {} removed)",
            summary.scanned,
            root.display(),
            summary.added,
            summary.changed,
            summary.removed
        );
        Ok(())
    }
}

/// Errors that can occur while refreshing resources
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Unsupported refresh scope: {0}")]
    InvalidScope(String),

    #[error("Refresh scope ${{workspace}} requires a workspace root")]
    MissingWorkspace,

    #[error("Refresh scope ${{project}} requires M2_POM_DIR")]
    MissingProject,

    #[error("Failed to scan '{path}': {source}")]
    Scan {
        path: String,
        #[source]
        source: walkdir::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubstitutionContext;
    use crate::runtime::events::EventBus;
    use crate::runtime::jobs::Job;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs jobs inline so tests can count refreshes synchronously
    #[derive(Default)]
    struct InlineJobs {
        scheduled: AtomicUsize,
    }

    impl JobScheduler for InlineJobs {
        fn schedule(&self, _name: &str, job: Job) {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
            job();
        }
    }

    #[derive(Default)]
    struct CountingRefresher {
        refreshes: AtomicUsize,
        fail: bool,
    }

    impl WorkspaceRefresher for CountingRefresher {
        fn refresh_resources(&self, _config: &LaunchConfiguration) -> Result<(), RefreshError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RefreshError::MissingWorkspace);
            }
            Ok(())
        }
    }

    struct Fixture {
        bus: Arc<EventBus>,
        jobs: Arc<InlineJobs>,
        refresher: Arc<CountingRefresher>,
        process: Arc<ProcessHandle>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                bus: Arc::new(EventBus::new()),
                jobs: Arc::new(InlineJobs::default()),
                refresher: Arc::new(CountingRefresher::default()),
                process: Arc::new(ProcessHandle::new("mvn")),
            }
        }

        fn coordinator(&self) -> Arc<ResourceRefresher> {
            ResourceRefresher::new(
                Arc::new(LaunchConfiguration::new("test")),
                self.process.clone(),
                self.bus.clone(),
                self.jobs.clone(),
                self.refresher.clone(),
            )
        }

        fn refreshes(&self) -> usize {
            self.refresher.refreshes.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_already_terminated_fires_immediately() {
        let fx = Fixture::new();
        fx.process.mark_terminated(Some(0));

        let coordinator = fx.coordinator();
        coordinator.start_background_refresh();

        assert_eq!(fx.refreshes(), 1);
        assert_eq!(coordinator.state(), RefreshState::Fired);
        assert_eq!(fx.bus.listener_count(), 0);

        fx.bus.fire(&[DebugEvent::terminate(fx.process.clone())]);
        assert_eq!(fx.refreshes(), 1);
    }

    #[test]
    fn test_fires_once_on_termination_event() {
        let fx = Fixture::new();
        let coordinator = fx.coordinator();
        coordinator.start_background_refresh();

        assert_eq!(coordinator.state(), RefreshState::Armed);
        assert_eq!(fx.bus.listener_count(), 1);
        assert_eq!(fx.refreshes(), 0);

        fx.process.mark_terminated(Some(1));
        fx.bus.fire(&[DebugEvent::terminate(fx.process.clone())]);
        fx.bus.fire(&[DebugEvent::terminate(fx.process.clone())]);

        assert_eq!(fx.refreshes(), 1);
        assert_eq!(fx.jobs.scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), RefreshState::Fired);
        assert_eq!(fx.bus.listener_count(), 0);
    }

    #[test]
    fn test_ignores_other_processes_and_event_kinds() {
        let fx = Fixture::new();
        let coordinator = fx.coordinator();
        coordinator.start_background_refresh();

        let other = Arc::new(ProcessHandle::new("other"));
        fx.bus.fire(&[DebugEvent::terminate(other)]);
        fx.bus.fire(&[DebugEvent::create(fx.process.clone())]);

        assert_eq!(fx.refreshes(), 0);
        assert_eq!(coordinator.state(), RefreshState::Armed);
        assert_eq!(fx.bus.listener_count(), 1);
    }

    #[test]
    fn test_matching_event_inside_a_batch() {
        let fx = Fixture::new();
        let coordinator = fx.coordinator();
        coordinator.start_background_refresh();

        let other = Arc::new(ProcessHandle::new("other"));
        fx.bus.fire(&[
            DebugEvent::terminate(other),
            DebugEvent::terminate(fx.process.clone()),
        ]);

        assert_eq!(fx.refreshes(), 1);
    }

    #[test]
    fn test_second_start_does_not_resubscribe() {
        let fx = Fixture::new();
        let coordinator = fx.coordinator();
        coordinator.start_background_refresh();
        coordinator.start_background_refresh();

        assert_eq!(fx.bus.listener_count(), 1);
        fx.bus.fire(&[DebugEvent::terminate(fx.process.clone())]);
        assert_eq!(fx.refreshes(), 1);
    }

    #[test]
    fn test_refresh_failure_is_contained() {
        let fx = Fixture {
            refresher: Arc::new(CountingRefresher {
                fail: true,
                ..Default::default()
            }),
            ..Fixture::new()
        };
        fx.process.mark_terminated(Some(0));

        let coordinator = fx.coordinator();
        coordinator.start_background_refresh();

        assert_eq!(fx.refreshes(), 1);
        assert_eq!(coordinator.state(), RefreshState::Fired);
    }

    #[test]
    fn test_termination_racing_start_fires_once() {
        for _ in 0..50 {
            let fx = Fixture::new();
            let coordinator = fx.coordinator();

            let terminator = {
                let process = fx.process.clone();
                let bus = fx.bus.clone();
                std::thread::spawn(move || {
                    process.mark_terminated(Some(0));
                    bus.fire(&[DebugEvent::terminate(process)]);
                })
            };
            coordinator.start_background_refresh();
            terminator.join().unwrap();

            assert_eq!(fx.refreshes(), 1);
            assert_eq!(fx.bus.listener_count(), 0);
        }
    }

    fn directory_refresher(root: Option<PathBuf>) -> DirectoryRefresher {
        DirectoryRefresher::new(root, Arc::new(SubstitutionContext::new()))
    }

    #[test]
    fn test_refresh_scope_resolution() {
        let refresher = directory_refresher(Some(PathBuf::from("/ws")));
        let config = |scope: &str| {
            LaunchConfiguration::new("t")
                .with_attribute(keys::REFRESH_SCOPE, scope)
                .with_attribute(keys::POM_DIR, "/ws/app")
        };

        assert_eq!(refresher.refresh_scope(&LaunchConfiguration::new("t")).unwrap(), None);
        assert_eq!(
            refresher.refresh_scope(&config("${workspace}")).unwrap(),
            Some(PathBuf::from("/ws"))
        );
        assert_eq!(
            refresher.refresh_scope(&config("${project}")).unwrap(),
            Some(PathBuf::from("/ws/app"))
        );
        assert_eq!(
            refresher.refresh_scope(&config("${resource:/ws/app/target}")).unwrap(),
            Some(PathBuf::from("/ws/app/target"))
        );
        assert!(matches!(
            refresher.refresh_scope(&config("${working_set:x}")),
            Err(RefreshError::InvalidScope(_))
        ));
        assert!(matches!(
            directory_refresher(None).refresh_scope(&config("${workspace}")),
            Err(RefreshError::MissingWorkspace)
        ));
    }

    #[test]
    fn test_refresh_path_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        let refresher = directory_refresher(None);

        let first = refresher.refresh_path(dir.path()).unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.added, 2);

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/app.jar"), b"jar").unwrap();

        let second = refresher.refresh_path(dir.path()).unwrap();
        assert_eq!(second.scanned, 2);
        assert_eq!(second.added, 1);
        assert_eq!(second.removed, 1);
    }
}
