//! Command-line interface for maven_launch

use crate::launch::{BuildType, LaunchMode};
use argh::FromArgs;
use std::collections::HashMap;
use std::path::PathBuf;

/// Launch a Maven build from a launch configuration and refresh the
/// workspace when it finishes
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the launch configuration (YAML)
    #[argh(positional)]
    pub config: PathBuf,

    /// launch mode: run or debug (default: run)
    #[argh(option, short = 'm', default = "LaunchMode::Run")]
    pub mode: LaunchMode,

    /// build type selecting the goals: auto, clean, full, incremental, manual
    #[argh(option, short = 'b', default = "BuildType::Manual")]
    pub build_type: BuildType,

    /// state directory for launch files (default: ~/.maven_launch)
    #[argh(option)]
    pub state_dir: Option<PathBuf>,

    /// preferences file (default: <state-dir>/preferences.yaml)
    #[argh(option, short = 'p')]
    pub preferences: Option<PathBuf>,

    /// define a substitution variable (format: name=value)
    #[argh(option, from_str_fn(parse_variable))]
    pub var: Vec<(String, String)>,

    /// show the assembled invocation without starting Maven
    #[argh(switch)]
    pub dry_run: bool,

    /// print the dry-run invocation as JSON
    #[argh(switch)]
    pub json: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse a variable definition in format "name=value"
fn parse_variable(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid variable '{}'. Expected 'name=value'", s)),
    }
}

impl LaunchArgs {
    /// Variables defined on the command line
    pub fn variables(&self) -> HashMap<String, String> {
        self.var.iter().cloned().collect()
    }

    /// Preferences file, relative to the state directory unless given
    pub fn preferences_file(&self, state_dir: &std::path::Path) -> PathBuf {
        self.preferences
            .clone()
            .unwrap_or_else(|| state_dir.join("preferences.yaml"))
    }
}
