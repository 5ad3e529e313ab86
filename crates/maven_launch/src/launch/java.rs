//! Generic Java process launching

use super::arguments::AssembledInvocation;
use super::delegate::LaunchError;
use crate::config::{keys, substitute_or_raw, LaunchConfiguration, VariableSubstitution};
use crate::console::Console;
use crate::runtime::{DebugEvent, EventBus, ProcessHandle};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Default JDWP port for debug launches
pub const DEFAULT_DEBUG_PORT: i64 = 8000;

/// Launch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    #[default]
    Run,
    /// Start the JVM with a JDWP agent waiting for a debugger
    Debug,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchMode::Run => f.write_str("run"),
            LaunchMode::Debug => f.write_str("debug"),
        }
    }
}

impl FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(LaunchMode::Run),
            "debug" => Ok(LaunchMode::Debug),
            other => Err(format!("Invalid launch mode '{}'. Expected run or debug", other)),
        }
    }
}

/// Everything a runner needs to start a JVM
#[derive(Debug, Clone, PartialEq)]
pub struct VmRunnerConfiguration {
    pub java_executable: PathBuf,
    pub main_type: String,
    pub classpath: Vec<String>,
    pub vm_arguments: Vec<String>,
    pub program_arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: Vec<(String, String)>,
}

impl VmRunnerConfiguration {
    /// Split the assembled argument strings into a runner request
    pub fn new(
        java_executable: PathBuf,
        invocation: &AssembledInvocation,
        working_directory: Option<PathBuf>,
        environment: Vec<(String, String)>,
    ) -> Self {
        Self {
            java_executable,
            main_type: invocation.main_type.clone(),
            classpath: invocation.classpath.clone(),
            vm_arguments: parse_arguments(&invocation.vm_arguments),
            program_arguments: parse_arguments(&invocation.program_arguments),
            working_directory,
            environment,
        }
    }

    /// Arguments passed to the java executable
    pub fn command_arguments(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.classpath.is_empty() {
            args.push("-classpath".to_string());
            args.push(std::env::join_paths(&self.classpath).map_or_else(
                |_| self.classpath.join(PATH_SEPARATOR),
                |joined| joined.to_string_lossy().into_owned(),
            ));
        }
        args.extend(self.vm_arguments.iter().cloned());
        args.push(self.main_type.clone());
        args.extend(self.program_arguments.iter().cloned());
        args
    }
}

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

/// Split a command line on whitespace, grouping double-quoted sections.
/// Quotes are removed; nothing is escaped.
pub fn parse_arguments(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Spawns a prepared JVM and reports the processes it produced
pub trait VmRunner: Send + Sync {
    fn run(&self, request: &VmRunnerConfiguration) -> Result<Vec<Arc<ProcessHandle>>, LaunchError>;
}

/// Generic Java launch capability: base settings plus the runner
pub trait JavaLaunch: Send + Sync {
    fn working_directory(&self, config: &LaunchConfiguration) -> Option<PathBuf>;

    /// User-configured VM arguments
    fn vm_arguments(&self, config: &LaunchConfiguration) -> String;

    fn environment(&self, config: &LaunchConfiguration) -> Vec<(String, String)>;

    fn java_executable(&self, config: &LaunchConfiguration) -> PathBuf;

    fn vm_runner(
        &self,
        config: &LaunchConfiguration,
        mode: LaunchMode,
    ) -> Result<Box<dyn VmRunner>, LaunchError>;
}

/// Launches local JVMs with tokio
pub struct JavaLauncher {
    handle: Handle,
    substitution: Arc<dyn VariableSubstitution>,
    console: Arc<dyn Console>,
    bus: Arc<EventBus>,
}

impl JavaLauncher {
    pub fn new(
        handle: Handle,
        substitution: Arc<dyn VariableSubstitution>,
        console: Arc<dyn Console>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            handle,
            substitution,
            console,
            bus,
        }
    }

    fn substituted(&self, config: &LaunchConfiguration, key: &str) -> Option<String> {
        config
            .string_opt(key)
            .filter(|value| !value.trim().is_empty())
            .map(|value| substitute_or_raw(self.substitution.as_ref(), &value))
    }
}

impl JavaLaunch for JavaLauncher {
    fn working_directory(&self, config: &LaunchConfiguration) -> Option<PathBuf> {
        self.substituted(config, keys::WORKING_DIRECTORY)
            .or_else(|| self.substituted(config, keys::POM_DIR))
            .map(PathBuf::from)
    }

    fn vm_arguments(&self, config: &LaunchConfiguration) -> String {
        self.substituted(config, keys::VM_ARGUMENTS).unwrap_or_default()
    }

    fn environment(&self, config: &LaunchConfiguration) -> Vec<(String, String)> {
        config
            .list_or_empty(keys::ENVIRONMENT)
            .into_iter()
            .filter_map(|item| match item.split_once('=') {
                Some((name, value)) => Some((
                    name.trim().to_string(),
                    substitute_or_raw(self.substitution.as_ref(), value),
                )),
                None => {
                    log::warn!("Ignoring environment entry without '=': {}", item);
                    None
                }
            })
            .collect()
    }

    fn java_executable(&self, config: &LaunchConfiguration) -> PathBuf {
        let java = if cfg!(windows) { "java.exe" } else { "java" };
        if let Some(jre) = self.substituted(config, keys::JRE) {
            return PathBuf::from(jre).join("bin").join(java);
        }
        match std::env::var_os("JAVA_HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home).join("bin").join(java),
            _ => PathBuf::from(java),
        }
    }

    fn vm_runner(
        &self,
        config: &LaunchConfiguration,
        mode: LaunchMode,
    ) -> Result<Box<dyn VmRunner>, LaunchError> {
        let debug_port = match mode {
            LaunchMode::Run => None,
            LaunchMode::Debug => {
                let port = config.int_or(keys::DEBUG_PORT, DEFAULT_DEBUG_PORT);
                Some(u16::try_from(port).map_err(|_| LaunchError::InvalidDebugPort(port))?)
            }
        };

        Ok(Box::new(CommandRunner {
            handle: self.handle.clone(),
            console: self.console.clone(),
            bus: self.bus.clone(),
            debug_port,
        }))
    }
}

/// Spawns the JVM as a child process and publishes its lifecycle on the bus
pub struct CommandRunner {
    handle: Handle,
    console: Arc<dyn Console>,
    bus: Arc<EventBus>,
    debug_port: Option<u16>,
}

impl VmRunner for CommandRunner {
    fn run(&self, request: &VmRunnerConfiguration) -> Result<Vec<Arc<ProcessHandle>>, LaunchError> {
        let _runtime = self.handle.enter();

        let mut args = Vec::new();
        if let Some(port) = self.debug_port {
            args.push(format!(
                "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address={}",
                port
            ));
            log::info!("Waiting for a debugger on port {}", port);
        }
        args.extend(request.command_arguments());

        let executable = request.java_executable.display().to_string();
        log::info!("Starting: {} {}", executable, args.join(" "));

        let mut cmd = Command::new(&request.java_executable);
        cmd.args(&args)
            .envs(request.environment.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &request.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| LaunchError::Spawn {
            executable: executable.clone(),
            source: e,
        })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let mut process = ProcessHandle::new("mvn").with_kill_switch(kill_tx);
        if let Some(pid) = child.id() {
            process = process.with_pid(pid);
        }
        let process = Arc::new(process);
        log::info!("[{}] Process started with PID: {:?}", process.label(), process.pid());

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, self.console.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, self.console.clone());
        }

        self.bus.fire(&[DebugEvent::create(process.clone())]);
        tokio::spawn(watch_process(child, kill_rx, process.clone(), self.bus.clone()));

        Ok(vec![process])
    }
}

/// Copy output lines to the console
fn forward_output<R>(stream: R, console: Arc<dyn Console>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            console.log_message(&line);
        }
    });
}

/// Wait for exit (or a termination request), then publish the termination
async fn watch_process(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    process: Arc<ProcessHandle>,
    bus: Arc<EventBus>,
) {
    let status: std::io::Result<ExitStatus> = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            log::info!("[{}] Terminating process...", process.label());
            if let Err(e) = child.start_kill() {
                log::warn!("[{}] Failed to kill process: {}", process.label(), e);
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            log::error!("[{}] Error waiting for process: {}", process.label(), e);
            None
        }
    };
    log::info!("[{}] Process exited with code: {:?}", process.label(), code);

    process.mark_terminated(code);
    bus.fire(&[DebugEvent::terminate(process.clone())]);
    process.announce_terminated();
}
