//! Persisted launcher preferences
//!
//! Preferences live in `~/.maven_launch/preferences.yaml` by default:
//!
//! ```yaml
//! debug_output: false
//! offline: false
//! user_settings_file: ~/.m2/settings.xml
//! default_runtime: maven-3.9
//! runtimes:
//!   maven-3.9:
//!     kind: external
//!     location: /opt/apache-maven-3.9.6
//! cli_resolver: /opt/m2launch/maven-workspace-resolver.jar
//! workspace_root: /home/me/workspace
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Runtime manager defaults and registered runtimes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// Default for `M2_DEBUG_OUTPUT`
    #[serde(default)]
    pub debug_output: bool,

    /// Default for `M2_OFFLINE`
    #[serde(default)]
    pub offline: bool,

    /// User settings file used when the launch does not override it
    #[serde(default)]
    pub user_settings_file: Option<String>,

    /// Runtime used when a launch names none (or an unknown one)
    #[serde(default)]
    pub default_runtime: Option<String>,

    /// Registered runtimes by id
    #[serde(default)]
    pub runtimes: IndexMap<String, RuntimeSpec>,

    /// Archive providing workspace artifact resolution to the CLI
    #[serde(default)]
    pub cli_resolver: Option<PathBuf>,

    /// Workspace root, exposed as `${workspace_loc}`
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Workspace state file read by the resolver
    #[serde(default)]
    pub workspace_state_file: Option<PathBuf>,

    /// Extra named substitution variables
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Declaration of a Maven runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuntimeSpec {
    /// A Maven installation directory (`boot/` and `lib/`)
    External { location: PathBuf },
    /// An explicit realm listing with no installation directory
    Embedded {
        main_type: String,
        main_realm: String,
        realms: IndexMap<String, Vec<String>>,
    },
}

impl Preferences {
    /// Load preferences, falling back to defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No preferences at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| PreferencesError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse preferences from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, PreferencesError> {
        let prefs: Preferences = serde_yaml::from_str(content)?;
        prefs.validate()?;
        Ok(prefs)
    }

    /// Check that the default runtime refers to a registered runtime
    pub fn validate(&self) -> Result<(), PreferencesError> {
        if let Some(id) = &self.default_runtime {
            if !self.runtimes.contains_key(id) {
                return Err(PreferencesError::Validation(format!(
                    "default runtime '{}' is not registered",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Location of the workspace state file, defaulting below the state directory
    pub fn workspace_state_file(&self, state_dir: &Path) -> PathBuf {
        self.workspace_state_file
            .clone()
            .unwrap_or_else(|| state_dir.join("workspacestate.properties"))
    }
}

/// Default process-wide state directory
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".maven_launch")
}

/// Errors that can occur when loading preferences
#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("Failed to read preferences '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse preferences: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preferences() {
        let yaml = r#"
offline: true
default_runtime: bundled
runtimes:
  maven3:
    kind: external
    location: /opt/maven
  bundled:
    kind: embedded
    main_type: org.apache.maven.cli.MavenCli
    main_realm: plexus.core
    realms:
      "]launcher": ["/opt/boot/classworlds.jar"]
      plexus.core: ["/opt/lib/maven-core.jar"]
"#;
        let prefs = Preferences::from_yaml(yaml).unwrap();
        assert!(prefs.offline);
        assert!(!prefs.debug_output);
        assert_eq!(prefs.runtimes.len(), 2);
        assert!(matches!(prefs.runtimes["maven3"], RuntimeSpec::External { .. }));
        match &prefs.runtimes["bundled"] {
            RuntimeSpec::Embedded { realms, .. } => assert_eq!(realms.len(), 2),
            other => panic!("unexpected runtime {:?}", other),
        }
    }

    #[test]
    fn test_unknown_default_runtime_is_rejected() {
        let result = Preferences::from_yaml("default_runtime: missing\n");
        assert!(matches!(result, Err(PreferencesError::Validation(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path().join("preferences.yaml")).unwrap();
        assert!(prefs.runtimes.is_empty());
        assert_eq!(
            prefs.workspace_state_file(dir.path()),
            dir.path().join("workspacestate.properties")
        );
    }
}
