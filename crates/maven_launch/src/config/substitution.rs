//! Substitution engine for `${name}`, `${name:argument}`, `${env_var:NAME}`
//! and `${system_property:NAME}` patterns

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Regex for matching substitution patterns: ${name} or ${name:argument}
static SUBSTITUTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([\w.]+)(?::([^}]*))?\}").unwrap());

/// String variable expansion applied to launch attribute values
pub trait VariableSubstitution: Send + Sync {
    fn substitute(&self, input: &str) -> Result<String, SubstitutionError>;
}

/// Substitution context containing all available variables
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Named variables, e.g. `workspace_loc`
    pub variables: HashMap<String, String>,
    /// Environment overrides consulted before the process environment
    pub env: HashMap<String, String>,
    /// JVM-style system properties, e.g. `user.home`
    pub properties: HashMap<String, String>,
}

impl SubstitutionContext {
    /// Create a new substitution context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named variable
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Add multiple named variables
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Add an environment variable override
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Add a system property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Substitute all patterns in a string
    pub fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut result = input.to_string();
        let mut last_result = String::new();

        // Iterate until no more substitutions are made (handles nested substitutions)
        let max_iterations = 10;
        let mut iterations = 0;

        while result != last_result && iterations < max_iterations {
            last_result = result.clone();
            result = self.substitute_once(&result)?;
            iterations += 1;
        }

        if iterations >= max_iterations && SUBSTITUTION_PATTERN.is_match(&result) {
            return Err(SubstitutionError::MaxIterationsExceeded(input.to_string()));
        }

        Ok(result)
    }

    /// Perform a single pass of substitution
    fn substitute_once(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut error: Option<SubstitutionError> = None;

        let result = SUBSTITUTION_PATTERN.replace_all(input, |caps: &Captures| {
            if error.is_some() {
                return String::new();
            }

            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let argument = caps.get(2).map(|m| m.as_str().trim());
            match self.resolve(name, argument) {
                Ok(value) => value,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            }
        });

        if let Some(e) = error {
            return Err(e);
        }

        Ok(result.into_owned())
    }

    /// Resolve a single variable reference
    fn resolve(&self, name: &str, argument: Option<&str>) -> Result<String, SubstitutionError> {
        match (name, argument) {
            ("env_var", Some(var)) => self.resolve_env(var),
            ("env_var", None) => Err(SubstitutionError::MissingArgument(name.to_string())),
            ("system_property", Some(property)) => self.resolve_property(property),
            ("system_property", None) => {
                Err(SubstitutionError::MissingArgument(name.to_string()))
            }
            (_, argument) => {
                let value = self
                    .variables
                    .get(name)
                    .ok_or_else(|| SubstitutionError::UndefinedVariable(name.to_string()))?;
                match argument {
                    // ${workspace_loc:/project} resolves below the variable's location
                    Some(sub) if !sub.is_empty() => Ok(Path::new(value)
                        .join(sub.trim_start_matches('/'))
                        .to_string_lossy()
                        .into_owned()),
                    _ => Ok(value.clone()),
                }
            }
        }
    }

    /// Resolve a system property, with `user.home` and `user.dir` built in
    fn resolve_property(&self, name: &str) -> Result<String, SubstitutionError> {
        if let Some(value) = self.properties.get(name) {
            return Ok(value.clone());
        }

        let builtin = match name {
            "user.home" => dirs::home_dir(),
            "user.dir" => std::env::current_dir().ok(),
            "java.io.tmpdir" => Some(std::env::temp_dir()),
            _ => None,
        };
        builtin
            .map(|path| path.to_string_lossy().into_owned())
            .ok_or_else(|| SubstitutionError::UndefinedProperty(name.to_string()))
    }

    /// Resolve an environment variable reference
    fn resolve_env(&self, name: &str) -> Result<String, SubstitutionError> {
        // First check our local env overrides
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }

        // Then check system environment
        std::env::var(name).map_err(|_| SubstitutionError::UndefinedEnv(name.to_string()))
    }
}

impl VariableSubstitution for SubstitutionContext {
    fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        SubstitutionContext::substitute(self, input)
    }
}

/// Substitute, logging failures and keeping the raw input
pub fn substitute_or_raw(substitution: &dyn VariableSubstitution, input: &str) -> String {
    match substitution.substitute(input) {
        Ok(value) => value,
        Err(e) => {
            log::error!("Could not substitute variables in '{}': {}", input, e);
            input.to_string()
        }
    }
}

/// Errors that can occur during substitution
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Undefined environment variable: {0}")]
    UndefinedEnv(String),

    #[error("Undefined system property: {0}")]
    UndefinedProperty(String),

    #[error("Variable '{0}' requires an argument")]
    MissingArgument(String),

    #[error("Maximum substitution iterations exceeded for: {0}")]
    MaxIterationsExceeded(String),
}
