//! Maven Launch
//!
//! Launches Maven builds from declarative launch configurations and refreshes
//! the workspace once each build terminates.
//!
//! # Overview
//!
//! A launch:
//! - selects a Maven runtime and writes its classloader realms to a
//!   temporary `m2.conf` for the classworlds bootstrap launcher
//! - assembles the Maven command line (properties, profiles, preference
//!   flags, goals for the build type) and the JVM arguments
//! - starts the JVM and forwards its output to the console
//! - refreshes the configured resources exactly once after the process
//!   terminates, even if it exits before the refresh is armed
//!
//! # Example Launch Configuration
//!
//! ```yaml
//! name: install-app
//! attributes:
//!   M2_POM_DIR: "${workspace_loc:/app}"
//!   M2_GOALS: "clean install"
//!   M2_PROFILES: "ci release"
//!   M2_PROPERTIES:
//!     - "revision=1.2.0"
//!   M2_SKIP_TESTS: true
//!   M2_WORKSPACE_RESOLUTION: true
//!   REFRESH_SCOPE: "${project}"
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod launch;
pub mod m2conf;
pub mod maven;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{
    LaunchConfiguration, Preferences, PreferencesError, SubstitutionContext, SubstitutionError,
};
pub use console::{Console, LogConsole};
pub use launch::{
    BuildType, JavaLauncher, Launch, LaunchEnvironment, LaunchError, LaunchMode,
    MavenLaunchDelegate, RefreshServices,
};
pub use m2conf::{LauncherConfiguration, LAUNCHER_REALM};
pub use maven::{ConfiguredComponents, RuntimeManager};
pub use runtime::{DirectoryRefresher, EventBus, JobQueue, ProcessHandle, ResourceRefresher};
