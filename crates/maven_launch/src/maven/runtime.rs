//! Maven runtime descriptors

use crate::m2conf::{LauncherConfiguration, LAUNCHER_REALM};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Entry point of the Maven command line inside the core realm
pub const MAVEN_CLI: &str = "org.apache.maven.cli.MavenCli";

/// Realm holding Maven's own libraries
pub const CORE_REALM: &str = "plexus.core";

/// A Maven installation able to describe its classloader realms
pub trait MavenRuntime: Send + Sync + fmt::Debug {
    /// Runtime id as registered with the runtime manager
    fn id(&self) -> &str;

    /// Installation directory, if the runtime has one
    fn location(&self) -> Option<&Path>;

    /// Add the runtime's realms, entries and main type to `conf`
    fn populate_realms(&self, conf: &mut LauncherConfiguration) -> Result<(), RuntimeError>;
}

/// Maven installed in a directory with `boot/` and `lib/` subdirectories
#[derive(Debug, Clone)]
pub struct ExternalRuntime {
    id: String,
    location: PathBuf,
}

impl ExternalRuntime {
    pub fn new(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }
}

impl MavenRuntime for ExternalRuntime {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.location)
    }

    fn populate_realms(&self, conf: &mut LauncherConfiguration) -> Result<(), RuntimeError> {
        if !self.location.is_dir() {
            return Err(RuntimeError::InvalidInstallation {
                id: self.id.clone(),
                reason: format!("{} is not a directory", self.location.display()),
            });
        }

        let boot = jars_in(&self.location.join("boot"))?;
        if boot.is_empty() {
            return Err(RuntimeError::InvalidInstallation {
                id: self.id.clone(),
                reason: format!("no boot archive in {}", self.location.join("boot").display()),
            });
        }
        for jar in boot {
            conf.add_archive_entry(LAUNCHER_REALM, jar);
        }

        conf.set_main_type(MAVEN_CLI, CORE_REALM);
        for jar in jars_in(&self.location.join("lib"))? {
            conf.add_archive_entry(CORE_REALM, jar);
        }

        Ok(())
    }
}

/// List `*.jar` files directly inside `dir`, sorted by name
fn jars_in(dir: &Path) -> Result<Vec<PathBuf>, RuntimeError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut jars = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| RuntimeError::Scan {
            path: dir.display().to_string(),
            source: e,
        })?;
        let is_jar = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "jar");
        if is_jar {
            jars.push(entry.into_path());
        }
    }
    Ok(jars)
}

/// A runtime described entirely by an explicit realm listing
#[derive(Debug, Clone)]
pub struct EmbeddedRuntime {
    id: String,
    main_type: String,
    main_realm: String,
    realms: IndexMap<String, Vec<String>>,
}

impl EmbeddedRuntime {
    pub fn new(
        id: impl Into<String>,
        main_type: impl Into<String>,
        main_realm: impl Into<String>,
        realms: IndexMap<String, Vec<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            main_type: main_type.into(),
            main_realm: main_realm.into(),
            realms,
        }
    }

    fn realm_entries_missing(&self) -> bool {
        self.realms
            .get(&self.main_realm)
            .map_or(true, |entries| entries.is_empty())
    }
}

impl MavenRuntime for EmbeddedRuntime {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> Option<&Path> {
        None
    }

    fn populate_realms(&self, conf: &mut LauncherConfiguration) -> Result<(), RuntimeError> {
        if self.realm_entries_missing() {
            return Err(RuntimeError::InvalidInstallation {
                id: self.id.clone(),
                reason: format!("realm '{}' has no entries", self.main_realm),
            });
        }

        conf.set_main_type(&self.main_type, &self.main_realm);
        for (realm, entries) in &self.realms {
            for entry in entries {
                conf.add_archive_entry(realm, entry);
            }
        }
        Ok(())
    }
}

/// Errors that can occur while resolving or describing a runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("No Maven runtime is registered")]
    NoRuntime,

    #[error("Invalid Maven runtime '{id}': {reason}")]
    InvalidInstallation { id: String, reason: String },

    #[error("Failed to scan '{path}': {source}")]
    Scan {
        path: String,
        #[source]
        source: walkdir::Error,
    },
}
