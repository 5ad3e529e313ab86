//! Launch configuration attribute store

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Attribute keys understood by the Maven launcher
pub mod keys {
    /// Default (manual build) goals
    pub const GOALS: &str = "M2_GOALS";
    pub const GOALS_AUTO_BUILD: &str = "M2_GOALS_AUTO_BUILD";
    pub const GOALS_MANUAL_BUILD: &str = "M2_GOALS_MANUAL_BUILD";
    pub const GOALS_CLEAN: &str = "M2_GOALS_CLEAN";
    pub const GOALS_AFTER_CLEAN: &str = "M2_GOALS_AFTER_CLEAN";

    /// List of `name=value` system properties
    pub const PROPERTIES: &str = "M2_PROPERTIES";
    /// Whitespace separated profile ids
    pub const PROFILES: &str = "M2_PROFILES";

    pub const DEBUG_OUTPUT: &str = "M2_DEBUG_OUTPUT";
    pub const OFFLINE: &str = "M2_OFFLINE";
    pub const UPDATE_SNAPSHOTS: &str = "M2_UPDATE_SNAPSHOTS";
    pub const NON_RECURSIVE: &str = "M2_NON_RECURSIVE";
    pub const SKIP_TESTS: &str = "M2_SKIP_TESTS";
    pub const WORKSPACE_RESOLUTION: &str = "M2_WORKSPACE_RESOLUTION";
    pub const USER_SETTINGS: &str = "M2_USER_SETTINGS";

    /// Runtime id, resolved through the runtime manager
    pub const RUNTIME: &str = "M2_RUNTIME";
    pub const POM_DIR: &str = "M2_POM_DIR";
    /// Extra classpath entries, `realm=path` or a bare path
    pub const USER_COMPONENTS: &str = "M2_USER_COMPONENTS";

    pub const VM_ARGUMENTS: &str = "VM_ARGUMENTS";
    pub const WORKING_DIRECTORY: &str = "WORKING_DIRECTORY";
    pub const JRE: &str = "JRE";
    pub const DEBUG_PORT: &str = "DEBUG_PORT";
    /// List of `NAME=value` environment variables
    pub const ENVIRONMENT: &str = "ENVIRONMENT";
    pub const REFRESH_SCOPE: &str = "REFRESH_SCOPE";
}

/// Attribute values can be booleans, integers, strings or string lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<String>),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "boolean",
            AttributeValue::Int(_) => "integer",
            AttributeValue::String(_) => "string",
            AttributeValue::List(_) => "list",
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::List(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        AttributeValue::List(value.into_iter().map(String::from).collect())
    }
}

/// An immutable, named set of launch attributes.
///
/// ```yaml
/// name: install
/// attributes:
///   M2_GOALS: "clean install"
///   M2_PROPERTIES:
///     - "maven.repo.local=${env_var:HOME}/.m2/alt"
///   M2_OFFLINE: true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchConfiguration {
    /// Configuration name (for logging)
    #[serde(default = "default_name")]
    name: String,

    /// Attributes, in declaration order
    #[serde(default)]
    attributes: IndexMap<String, AttributeValue>,
}

fn default_name() -> String {
    "maven".to_string()
}

impl LaunchConfiguration {
    /// Create an empty configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Load a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AttributeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AttributeError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, AttributeError> {
        serde_yaml::from_str(content).map_err(AttributeError::Parse)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Read a string attribute
    pub fn get_string(&self, key: &str) -> Result<Option<&str>, AttributeError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(AttributeValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }

    /// Read a boolean attribute
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, AttributeError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(AttributeValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(key, "boolean", other)),
        }
    }

    /// Read an integer attribute
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, AttributeError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(AttributeValue::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(mismatch(key, "integer", other)),
        }
    }

    /// Read a string list attribute
    pub fn get_list(&self, key: &str) -> Result<Option<&[String]>, AttributeError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(AttributeValue::List(l)) => Ok(Some(l)),
            Some(other) => Err(mismatch(key, "list", other)),
        }
    }

    /// Read a string attribute, treating read failures as absent
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key)
            .unwrap_or_else(|e| absent(key, e))
            .unwrap_or(default)
            .to_string()
    }

    /// Read an optional string attribute, treating read failures as absent
    pub fn string_opt(&self, key: &str) -> Option<String> {
        self.get_string(key)
            .unwrap_or_else(|e| absent(key, e))
            .map(String::from)
    }

    /// Read a boolean attribute, treating read failures as absent
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key)
            .unwrap_or_else(|e| absent(key, e))
            .unwrap_or(default)
    }

    /// Read an integer attribute, treating read failures as absent
    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key)
            .unwrap_or_else(|e| absent(key, e))
            .unwrap_or(default)
    }

    /// Read a list attribute, treating read failures as an empty list
    pub fn list_or_empty(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .unwrap_or_else(|e| absent(key, e))
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }
}

fn mismatch(key: &str, expected: &'static str, found: &AttributeValue) -> AttributeError {
    AttributeError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn absent<T>(key: &str, error: AttributeError) -> Option<T> {
    log::error!("Exception while getting configuration attribute {}: {}", key, error);
    None
}

/// Errors that can occur when reading a launch configuration
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("Failed to read launch configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse launch configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Attribute '{key}' is a {found}, expected a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}
