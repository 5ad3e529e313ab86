//! Maven launch delegate
//!
//! Turns a [`LaunchConfiguration`] into a running Maven build: selects the
//! runtime, writes the classworlds descriptor to a temporary `m2.conf`,
//! assembles the command line and starts the JVM. When a process comes up,
//! a [`ResourceRefresher`] is attached so the workspace is refreshed once the
//! build terminates.

use super::arguments::{ArgumentAssembler, AssembledInvocation, BuildType};
use super::java::{JavaLaunch, LaunchMode, VmRunner, VmRunnerConfiguration};
use crate::config::{keys, LaunchConfiguration, SubstitutionContext, VariableSubstitution};
use crate::console::{Console, LogConsole};
use crate::m2conf::{LauncherConfigError, LauncherConfiguration, LAUNCHER_REALM};
use crate::maven::{ConfiguredComponents, MavenRuntime, RuntimeError, RuntimeManager, UserComponents};
use crate::runtime::{
    DebugEventBus, JobScheduler, ProcessHandle, ResourceRefresher, WorkspaceRefresher,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use thiserror::Error;

/// Bootstrap class that reads `classworlds.conf`
pub const LAUNCHER_TYPE: &str = "org.codehaus.classworlds.Launcher";

/// Subdirectory of the state directory holding launcher config files
pub const LAUNCHES_DIR: &str = "launches";

/// Process-wide inputs to every launch
#[derive(Debug, Clone, Default)]
pub struct LaunchEnvironment {
    /// Root for temporary launch files
    pub state_dir: PathBuf,
    /// Workspace state passed with `-Dm2eclipse.workspace.state`
    pub workspace_state_file: PathBuf,
    /// Resolver archive added to the launcher realm for workspace resolution
    pub cli_resolver: Option<PathBuf>,
    pub build_type: BuildType,
}

impl LaunchEnvironment {
    pub fn launches_dir(&self) -> PathBuf {
        self.state_dir.join(LAUNCHES_DIR)
    }
}

/// Collaborators needed to refresh the workspace after a build
#[derive(Clone)]
pub struct RefreshServices {
    pub bus: Arc<dyn DebugEventBus>,
    pub jobs: Arc<dyn JobScheduler>,
    pub refresher: Arc<dyn WorkspaceRefresher>,
}

/// A launch that has been assembled but not started.
///
/// The launcher config file is removed when this is dropped, unless kept
/// with [`PreparedLaunch::keep_conf_file`].
pub struct PreparedLaunch {
    pub runtime: Arc<dyn MavenRuntime>,
    pub descriptor: LauncherConfiguration,
    pub invocation: AssembledInvocation,
    pub working_directory: Option<PathBuf>,
    conf_file: TempPath,
}

impl PreparedLaunch {
    pub fn conf_file(&self) -> &Path {
        &self.conf_file
    }

    /// Persist the launcher config file so the printed command stays runnable
    pub fn keep_conf_file(self) -> Result<PathBuf, LaunchError> {
        self.conf_file
            .keep()
            .map_err(|e| LaunchError::ConfFile(e.error.into()))
    }
}

/// A started launch.
///
/// The launcher config file stays on disk until the first process
/// terminates, independently of this value.
pub struct Launch {
    config: Arc<LaunchConfiguration>,
    mode: LaunchMode,
    processes: Vec<Arc<ProcessHandle>>,
    conf_file: PathBuf,
}

impl Launch {
    pub fn config(&self) -> &LaunchConfiguration {
        &self.config
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn processes(&self) -> &[Arc<ProcessHandle>] {
        &self.processes
    }

    pub fn conf_file(&self) -> &Path {
        &self.conf_file
    }

    pub fn is_terminated(&self) -> bool {
        self.processes.iter().all(|p| p.is_terminated())
    }

    /// Ask every process to terminate. Returns how many requests were sent.
    pub fn terminate(&self) -> usize {
        self.processes
            .iter()
            .filter(|p| p.request_terminate())
            .count()
    }

    /// Wait for every process to announce termination
    pub async fn wait(&self) {
        for process in &self.processes {
            process.wait_announced().await;
        }
    }
}

impl std::fmt::Debug for Launch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launch")
            .field("config", &self.config.name())
            .field("mode", &self.mode)
            .field("processes", &self.processes.len())
            .field("conf_file", &self.conf_file)
            .finish()
    }
}

/// Launches Maven builds on top of a generic Java launch capability
pub struct MavenLaunchDelegate<J> {
    java: J,
    runtimes: RuntimeManager,
    environment: LaunchEnvironment,
    refresh: RefreshServices,
    substitution: Arc<dyn VariableSubstitution>,
    components: Arc<dyn UserComponents>,
    console: Arc<dyn Console>,
}

impl<J: JavaLaunch> MavenLaunchDelegate<J> {
    pub fn new(
        java: J,
        runtimes: RuntimeManager,
        environment: LaunchEnvironment,
        refresh: RefreshServices,
    ) -> Self {
        Self {
            java,
            runtimes,
            environment,
            refresh,
            substitution: Arc::new(SubstitutionContext::new()),
            components: Arc::new(ConfiguredComponents),
            console: Arc::new(LogConsole),
        }
    }

    pub fn with_substitution(mut self, substitution: Arc<dyn VariableSubstitution>) -> Self {
        self.substitution = substitution;
        self
    }

    pub fn with_components(mut self, components: Arc<dyn UserComponents>) -> Self {
        self.components = components;
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn environment(&self) -> &LaunchEnvironment {
        &self.environment
    }

    fn assembler(&self) -> ArgumentAssembler<'_> {
        ArgumentAssembler::new(
            &self.runtimes,
            self.substitution.as_ref(),
            self.console.as_ref(),
            self.environment.build_type,
        )
    }

    /// Start the build described by `config`
    pub fn launch(
        &self,
        config: Arc<LaunchConfiguration>,
        mode: LaunchMode,
    ) -> Result<Launch, LaunchError> {
        let prepared = self.prepare(&config)?;

        let request = VmRunnerConfiguration::new(
            self.java.java_executable(&config),
            &prepared.invocation,
            prepared.working_directory.clone(),
            self.java.environment(&config),
        );

        let runner = RefreshingRunner::new(
            self.java.vm_runner(&config, mode)?,
            config.clone(),
            self.refresh.clone(),
        );
        let processes = runner.run(&request)?;

        let conf_file = prepared.conf_file.to_path_buf();
        match processes.first() {
            Some(process) => process.retain_until_terminated(prepared.conf_file),
            None => drop(prepared.conf_file),
        }

        Ok(Launch {
            config,
            mode,
            processes,
            conf_file,
        })
    }

    /// Select the runtime, write the launcher config file and assemble the
    /// command line, without starting anything
    pub fn prepare(&self, config: &LaunchConfiguration) -> Result<PreparedLaunch, LaunchError> {
        let assembler = self.assembler();

        let working_directory = self.java.working_directory(config);
        let program_arguments = assembler.program_arguments(config);
        self.console.log_message(
            &working_directory
                .as_deref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
        );
        self.console
            .log_message(&format!(" mvn {}", program_arguments));

        let runtime = self.runtimes.runtime_for(config)?;
        let descriptor = self.launcher_configuration(config, runtime.as_ref())?;
        let conf_file = self.write_launcher_configuration(&descriptor)?;

        let vm_arguments = assembler.vm_arguments(
            config,
            runtime.location(),
            &conf_file,
            &self.environment.workspace_state_file,
            &self.java.vm_arguments(config),
        );

        let invocation = AssembledInvocation {
            main_type: LAUNCHER_TYPE.to_string(),
            classpath: descriptor.realm_entries(LAUNCHER_REALM).to_vec(),
            program_arguments,
            vm_arguments,
        };

        Ok(PreparedLaunch {
            runtime,
            descriptor,
            invocation,
            working_directory,
            conf_file,
        })
    }

    /// Resolver entry (when enabled), user components, then the runtime realms
    pub fn launcher_configuration(
        &self,
        config: &LaunchConfiguration,
        runtime: &dyn MavenRuntime,
    ) -> Result<LauncherConfiguration, LaunchError> {
        let mut descriptor = LauncherConfiguration::new();

        if config.bool_or(keys::WORKSPACE_RESOLUTION, false) {
            match &self.environment.cli_resolver {
                Some(resolver) => descriptor.add_archive_entry(LAUNCHER_REALM, resolver),
                None => log::warn!(
                    "Workspace resolution requested by '{}' but no resolver archive is configured",
                    config.name()
                ),
            }
        }

        self.components.add_user_components(config, &mut descriptor);
        runtime.populate_realms(&mut descriptor)?;

        Ok(descriptor)
    }

    /// Write the descriptor to `<state-dir>/launches/m2conf<random>.tmp`
    pub fn write_launcher_configuration(
        &self,
        descriptor: &LauncherConfiguration,
    ) -> Result<TempPath, LaunchError> {
        let dir = self.environment.launches_dir();
        fs::create_dir_all(&dir).map_err(|e| LaunchError::ConfFile(e.into()))?;

        let mut file = tempfile::Builder::new()
            .prefix("m2conf")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| LaunchError::ConfFile(e.into()))?;

        descriptor.save(&mut file).map_err(LaunchError::ConfFile)?;
        log::debug!("Wrote launcher configuration to {}", file.path().display());

        Ok(file.into_temp_path())
    }
}

/// Attaches a [`ResourceRefresher`] to the first process a runner produces
pub struct RefreshingRunner {
    inner: Box<dyn VmRunner>,
    config: Arc<LaunchConfiguration>,
    services: RefreshServices,
}

impl RefreshingRunner {
    pub fn new(
        inner: Box<dyn VmRunner>,
        config: Arc<LaunchConfiguration>,
        services: RefreshServices,
    ) -> Self {
        Self {
            inner,
            config,
            services,
        }
    }
}

impl VmRunner for RefreshingRunner {
    fn run(&self, request: &VmRunnerConfiguration) -> Result<Vec<Arc<ProcessHandle>>, LaunchError> {
        let processes = self.inner.run(request)?;

        if let Some(process) = processes.first() {
            let refresher = ResourceRefresher::new(
                self.config.clone(),
                process.clone(),
                self.services.bus.clone(),
                self.services.jobs.clone(),
                self.services.refresher.clone(),
            );
            refresher.start_background_refresh();
        }

        Ok(processes)
    }
}

/// Errors that abort a launch
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Can't create m2.conf: {0}")]
    ConfFile(#[source] LauncherConfigError),

    #[error("Failed to start '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid debug port: {0}")]
    InvalidDebugPort(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maven::EmbeddedRuntime;
    use crate::runtime::{DebugEvent, EventBus, Job, RefreshError};
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct InlineJobs;

    impl JobScheduler for InlineJobs {
        fn schedule(&self, _name: &str, job: Job) {
            job();
        }
    }

    #[derive(Default)]
    struct CountingRefresher(AtomicUsize);

    impl WorkspaceRefresher for CountingRefresher {
        fn refresh_resources(&self, _config: &LaunchConfiguration) -> Result<(), RefreshError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records the request and returns a handle without spawning anything
    #[derive(Default)]
    struct FakeRunner {
        requests: Arc<Mutex<Vec<VmRunnerConfiguration>>>,
        terminated: bool,
        no_process: bool,
    }

    impl VmRunner for FakeRunner {
        fn run(&self, request: &VmRunnerConfiguration) -> Result<Vec<Arc<ProcessHandle>>, LaunchError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.no_process {
                return Ok(Vec::new());
            }
            let process = Arc::new(ProcessHandle::new("fake"));
            if self.terminated {
                process.mark_terminated(Some(0));
            }
            Ok(vec![process])
        }
    }

    struct FakeJava {
        requests: Arc<Mutex<Vec<VmRunnerConfiguration>>>,
        terminated: bool,
        no_process: bool,
    }

    impl JavaLaunch for FakeJava {
        fn working_directory(&self, _config: &LaunchConfiguration) -> Option<PathBuf> {
            Some(PathBuf::from("/work"))
        }

        fn vm_arguments(&self, _config: &LaunchConfiguration) -> String {
            "-Xmx512m".to_string()
        }

        fn environment(&self, _config: &LaunchConfiguration) -> Vec<(String, String)> {
            Vec::new()
        }

        fn java_executable(&self, _config: &LaunchConfiguration) -> PathBuf {
            PathBuf::from("java")
        }

        fn vm_runner(
            &self,
            _config: &LaunchConfiguration,
            _mode: LaunchMode,
        ) -> Result<Box<dyn VmRunner>, LaunchError> {
            Ok(Box::new(FakeRunner {
                requests: self.requests.clone(),
                terminated: self.terminated,
                no_process: self.no_process,
            }))
        }
    }

    struct Fixture {
        _state: TempDir,
        delegate: MavenLaunchDelegate<FakeJava>,
        requests: Arc<Mutex<Vec<VmRunnerConfiguration>>>,
        bus: Arc<EventBus>,
        refreshes: Arc<CountingRefresher>,
    }

    fn fixture(terminated: bool, no_process: bool) -> Fixture {
        let state = TempDir::new().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(EventBus::new());
        let refreshes = Arc::new(CountingRefresher::default());

        let mut realms = IndexMap::new();
        realms.insert(LAUNCHER_REALM.to_string(), vec!["/m2/boot/classworlds.jar".to_string()]);
        realms.insert("plexus.core".to_string(), vec!["/m2/lib/maven-core.jar".to_string()]);
        let mut runtimes = RuntimeManager::new();
        runtimes.register(Arc::new(EmbeddedRuntime::new(
            "embedded",
            "org.apache.maven.cli.MavenCli",
            "plexus.core",
            realms,
        )));

        let environment = LaunchEnvironment {
            state_dir: state.path().to_path_buf(),
            workspace_state_file: state.path().join("workspacestate.properties"),
            cli_resolver: Some(PathBuf::from("/m2/cli-resolver.jar")),
            build_type: BuildType::Manual,
        };
        let services = RefreshServices {
            bus: bus.clone(),
            jobs: Arc::new(InlineJobs),
            refresher: refreshes.clone(),
        };
        let java = FakeJava {
            requests: requests.clone(),
            terminated,
            no_process,
        };

        Fixture {
            _state: state,
            delegate: MavenLaunchDelegate::new(java, runtimes, environment, services),
            requests,
            bus,
            refreshes,
        }
    }

    fn config() -> Arc<LaunchConfiguration> {
        Arc::new(
            LaunchConfiguration::new("build")
                .with_attribute(keys::GOALS, "install")
                .with_attribute(keys::WORKSPACE_RESOLUTION, true),
        )
    }

    #[test]
    fn test_launch_builds_request() {
        let fx = fixture(false, false);
        let launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();

        let requests = fx.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.main_type, LAUNCHER_TYPE);
        assert_eq!(
            request.classpath,
            vec!["/m2/cli-resolver.jar", "/m2/boot/classworlds.jar"]
        );
        assert_eq!(request.program_arguments, vec!["-B", "install"]);
        assert_eq!(request.working_directory, Some(PathBuf::from("/work")));
        assert_eq!(request.vm_arguments.last().map(String::as_str), Some("-Xmx512m"));
        assert!(request
            .vm_arguments
            .iter()
            .any(|arg| arg == &format!("-Dclassworlds.conf={}", launch.conf_file().display())));
    }

    #[test]
    fn test_conf_file_lives_under_launches_until_termination() {
        let fx = fixture(false, false);
        let launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();
        let path = launch.conf_file().to_path_buf();
        let process = launch.processes()[0].clone();

        assert_eq!(path.parent(), Some(fx.delegate.environment().launches_dir().as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("m2conf"));
        assert!(name.ends_with(".tmp"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("main is org.apache.maven.cli.MavenCli from plexus.core\n"));
        assert!(!content.contains(LAUNCHER_REALM));

        // the running process still reads it
        drop(launch);
        assert!(!process.is_terminated());
        assert!(path.exists());

        process.mark_terminated(Some(0));
        assert!(!path.exists());
    }

    #[test]
    fn test_conf_file_removed_without_process() {
        let fx = fixture(false, true);
        let launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();
        assert!(!launch.conf_file().exists());
    }

    #[test]
    fn test_conf_file_removed_for_already_terminated_process() {
        let fx = fixture(true, false);
        let launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();
        assert!(!launch.conf_file().exists());
    }

    #[test]
    fn test_prepared_conf_file_can_be_kept() {
        let fx = fixture(false, false);
        let prepared = fx.delegate.prepare(&config()).unwrap();
        let dropped = prepared.conf_file().to_path_buf();
        drop(prepared);
        assert!(!dropped.exists());

        let prepared = fx.delegate.prepare(&config()).unwrap();
        let kept = prepared.keep_conf_file().unwrap();
        assert!(kept.exists());
        assert!(fs::read_to_string(&kept).unwrap().starts_with("main is "));
        fs::remove_file(kept).unwrap();
    }

    #[test]
    fn test_refresh_fires_once_on_termination() {
        let fx = fixture(false, false);
        let launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();
        let process = launch.processes()[0].clone();
        assert_eq!(fx.bus.listener_count(), 1);
        assert_eq!(fx.refreshes.0.load(Ordering::SeqCst), 0);

        process.mark_terminated(Some(0));
        fx.bus.fire(&[DebugEvent::terminate(process.clone())]);
        fx.bus.fire(&[DebugEvent::terminate(process)]);

        assert_eq!(fx.refreshes.0.load(Ordering::SeqCst), 1);
        assert_eq!(fx.bus.listener_count(), 0);
    }

    #[test]
    fn test_refresh_fires_immediately_for_terminated_process() {
        let fx = fixture(true, false);
        let _launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();

        assert_eq!(fx.refreshes.0.load(Ordering::SeqCst), 1);
        assert_eq!(fx.bus.listener_count(), 0);
    }

    #[test]
    fn test_no_process_no_refresher() {
        let fx = fixture(false, true);
        let launch = fx.delegate.launch(config(), LaunchMode::Run).unwrap();

        assert!(launch.processes().is_empty());
        assert_eq!(fx.bus.listener_count(), 0);
        assert_eq!(fx.refreshes.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unwritable_state_dir_reports_conf_file_error() {
        let mut fx = fixture(false, false);
        let blocker = fx._state.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        fx.delegate.environment.state_dir = blocker;

        let err = fx.delegate.launch(config(), LaunchMode::Run).unwrap_err();
        assert!(matches!(err, LaunchError::ConfFile(_)));
        assert!(err.to_string().starts_with("Can't create m2.conf"));
        assert!(fx.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resolver_skipped_without_workspace_resolution() {
        let fx = fixture(false, false);
        let config = LaunchConfiguration::new("build").with_attribute(keys::GOALS, "install");
        let prepared = fx.delegate.prepare(&config).unwrap();

        assert_eq!(
            prepared.invocation.classpath,
            vec!["/m2/boot/classworlds.jar"]
        );
        assert!(!prepared.invocation.vm_arguments.contains("m2eclipse.workspace.state"));
    }

    #[test]
    fn test_missing_runtime_aborts() {
        let state = TempDir::new().unwrap();
        let delegate = MavenLaunchDelegate::new(
            FakeJava {
                requests: Arc::new(Mutex::new(Vec::new())),
                terminated: false,
                no_process: false,
            },
            RuntimeManager::new(),
            LaunchEnvironment {
                state_dir: state.path().to_path_buf(),
                ..LaunchEnvironment::default()
            },
            RefreshServices {
                bus: Arc::new(EventBus::new()),
                jobs: Arc::new(InlineJobs),
                refresher: Arc::new(CountingRefresher::default()),
            },
        );

        let err = delegate.launch(config(), LaunchMode::Run).unwrap_err();
        assert!(matches!(err, LaunchError::Runtime(RuntimeError::NoRuntime)));
        assert!(!state.path().join(LAUNCHES_DIR).exists());
    }
}
