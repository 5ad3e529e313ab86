//! Maven command line assembly

use crate::config::{keys, substitute_or_raw, LaunchConfiguration, VariableSubstitution};
use crate::console::Console;
use crate::maven::RuntimeManager;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What triggered the build being launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    Auto,
    Clean,
    Full,
    Incremental,
    /// Explicit launch outside of any build
    #[default]
    Manual,
}

impl BuildType {
    /// Attribute holding the goals for this build type
    pub fn goals_key(self) -> &'static str {
        match self {
            BuildType::Auto => keys::GOALS_AUTO_BUILD,
            BuildType::Clean => keys::GOALS_CLEAN,
            BuildType::Full => keys::GOALS_AFTER_CLEAN,
            BuildType::Incremental => keys::GOALS_MANUAL_BUILD,
            BuildType::Manual => keys::GOALS,
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildType::Auto => "auto",
            BuildType::Clean => "clean",
            BuildType::Full => "full",
            BuildType::Incremental => "incremental",
            BuildType::Manual => "manual",
        };
        f.write_str(name)
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BuildType::Auto),
            "clean" => Ok(BuildType::Clean),
            "full" => Ok(BuildType::Full),
            "incremental" => Ok(BuildType::Incremental),
            "manual" | "" => Ok(BuildType::Manual),
            other => Err(format!(
                "Invalid build type '{}'. Expected auto, clean, full, incremental or manual",
                other
            )),
        }
    }
}

/// Wrap in double quotes if the string contains a space. Embedded quotes are
/// not escaped.
pub fn quote(s: &str) -> Cow<'_, str> {
    if s.contains(' ') {
        Cow::Owned(format!("\"{}\"", s))
    } else {
        Cow::Borrowed(s)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Everything needed to start the bootstrap launcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledInvocation {
    pub main_type: String,
    pub classpath: Vec<String>,
    pub program_arguments: String,
    pub vm_arguments: String,
}

/// Computes Maven program and VM arguments from a launch configuration
pub struct ArgumentAssembler<'a> {
    runtimes: &'a RuntimeManager,
    substitution: &'a dyn VariableSubstitution,
    console: &'a dyn Console,
    build_type: BuildType,
}

impl<'a> ArgumentAssembler<'a> {
    pub fn new(
        runtimes: &'a RuntimeManager,
        substitution: &'a dyn VariableSubstitution,
        console: &'a dyn Console,
        build_type: BuildType,
    ) -> Self {
        Self {
            runtimes,
            substitution,
            console,
            build_type,
        }
    }

    /// System properties, preference flags and goals, space separated
    pub fn program_arguments(&self, config: &LaunchConfiguration) -> String {
        [
            self.properties(config),
            self.preferences(config),
            self.goals(config),
        ]
        .into_iter()
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// `-Dname=value` for each declared property, then `-P` with the profiles
    pub fn properties(&self, config: &LaunchConfiguration) -> String {
        let mut args = Vec::new();

        for property in config.list_or_empty(keys::PROPERTIES) {
            // Only the first '=' separates the name, the rest belongs to the value
            let Some((name, value)) = property.split_once('=') else {
                log::warn!("Ignoring property without a value: {}", property);
                continue;
            };
            let value = substitute_or_raw(self.substitution, value);
            args.push(format!("-D{}={}", name, quote(&value)));
        }

        if let Some(profiles) = config.string_opt(keys::PROFILES) {
            let profiles: Vec<&str> = profiles.split_whitespace().collect();
            if !profiles.is_empty() {
                args.push(format!("-P{}", profiles.join(",")));
            }
        }

        args.join(" ")
    }

    /// Batch mode plus flags taken from the configuration or the runtime
    /// manager defaults
    pub fn preferences(&self, config: &LaunchConfiguration) -> String {
        let mut args = vec!["-B".to_string()];

        if config.bool_or(keys::DEBUG_OUTPUT, self.runtimes.is_debug_output()) {
            args.push("-X".to_string());
            args.push("-e".to_string());
        }

        if config.bool_or(keys::OFFLINE, self.runtimes.is_offline()) {
            args.push("-o".to_string());
        }

        if config.bool_or(keys::UPDATE_SNAPSHOTS, false) {
            args.push("-U".to_string());
        }

        if config.bool_or(keys::NON_RECURSIVE, false) {
            args.push("-N".to_string());
        }

        if config.bool_or(keys::SKIP_TESTS, false) {
            args.push("-Dmaven.test.skip=true".to_string());
        }

        if let Some(settings) = self.user_settings(config) {
            args.push("-s".to_string());
            args.push(quote(&settings).into_owned());
        }

        args.join(" ")
    }

    fn user_settings(&self, config: &LaunchConfiguration) -> Option<String> {
        config
            .string_opt(keys::USER_SETTINGS)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.runtimes
                    .user_settings_file()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            })
    }

    /// Goals for the current build type, falling back to the default goals
    pub fn goals(&self, config: &LaunchConfiguration) -> String {
        let key = self.build_type.goals_key();
        let mut goals = config.string_or(key, "");
        if goals.trim().is_empty() {
            // whitespace-only counts as unset
            goals = config.string_or(keys::GOALS, "");
        }

        self.console
            .log_message(&format!("Build type {} : {}", self.build_type, goals));
        goals
    }

    /// Workspace state, `maven.home`, `classworlds.conf`, then the base VM
    /// arguments so user overrides come last
    pub fn vm_arguments(
        &self,
        config: &LaunchConfiguration,
        runtime_location: Option<&Path>,
        conf_file: &Path,
        workspace_state_file: &Path,
        base_vm_arguments: &str,
    ) -> String {
        let mut args = Vec::new();

        // workspace artifact resolution
        if config.bool_or(keys::WORKSPACE_RESOLUTION, false) {
            let state = absolute(workspace_state_file);
            args.push(format!(
                "-Dm2eclipse.workspace.state={}",
                quote(&state.to_string_lossy())
            ));
        }

        if let Some(location) = runtime_location {
            args.push(format!("-Dmaven.home={}", quote(&location.to_string_lossy())));
        }

        let conf = absolute(conf_file);
        args.push(format!("-Dclassworlds.conf={}", quote(&conf.to_string_lossy())));

        if !base_vm_arguments.trim().is_empty() {
            args.push(base_vm_arguments.to_string());
        }

        args.join(" ")
    }
}

impl fmt::Display for AssembledInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Maven Invocation")?;
        writeln!(f, "================")?;
        writeln!(f, "Main type: {}", self.main_type)?;
        writeln!(f, "Classpath:")?;
        for entry in &self.classpath {
            writeln!(f, "  {}", entry)?;
        }
        writeln!(f, "VM arguments: {}", self.vm_arguments)?;
        write!(f, "Program arguments: {}", self.program_arguments)
    }
}
