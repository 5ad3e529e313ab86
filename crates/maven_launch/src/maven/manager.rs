//! Runtime registry and launcher-wide defaults

use super::runtime::{EmbeddedRuntime, ExternalRuntime, MavenRuntime, RuntimeError};
use crate::config::{keys, LaunchConfiguration, Preferences, RuntimeSpec};
use indexmap::IndexMap;
use std::sync::Arc;

/// Registered runtimes plus the defaults used when a launch leaves a
/// preference unset
#[derive(Debug, Default)]
pub struct RuntimeManager {
    runtimes: IndexMap<String, Arc<dyn MavenRuntime>>,
    default_runtime: Option<String>,
    debug_output: bool,
    offline: bool,
    user_settings_file: Option<String>,
}

impl RuntimeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager from persisted preferences
    pub fn from_preferences(prefs: &Preferences) -> Self {
        let mut manager = Self::new();
        for (id, spec) in &prefs.runtimes {
            let runtime: Arc<dyn MavenRuntime> = match spec {
                RuntimeSpec::External { location } => {
                    Arc::new(ExternalRuntime::new(id.clone(), location.clone()))
                }
                RuntimeSpec::Embedded {
                    main_type,
                    main_realm,
                    realms,
                } => Arc::new(EmbeddedRuntime::new(
                    id.clone(),
                    main_type.clone(),
                    main_realm.clone(),
                    realms.clone(),
                )),
            };
            manager.register(runtime);
        }
        manager.default_runtime = prefs.default_runtime.clone();
        manager.debug_output = prefs.debug_output;
        manager.offline = prefs.offline;
        manager.user_settings_file = prefs.user_settings_file.clone();
        manager
    }

    /// Register a runtime; the first registered runtime is the default
    /// unless one is set explicitly
    pub fn register(&mut self, runtime: Arc<dyn MavenRuntime>) {
        self.runtimes.insert(runtime.id().to_string(), runtime);
    }

    pub fn with_default_runtime(mut self, id: impl Into<String>) -> Self {
        self.default_runtime = Some(id.into());
        self
    }

    pub fn with_debug_output(mut self, debug_output: bool) -> Self {
        self.debug_output = debug_output;
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_user_settings_file(mut self, path: impl Into<String>) -> Self {
        self.user_settings_file = Some(path.into());
        self
    }

    pub fn is_debug_output(&self) -> bool {
        self.debug_output
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn user_settings_file(&self) -> Option<&str> {
        self.user_settings_file.as_deref()
    }

    pub fn runtime(&self, id: &str) -> Option<Arc<dyn MavenRuntime>> {
        self.runtimes.get(id).cloned()
    }

    /// The default runtime
    pub fn default_runtime(&self) -> Result<Arc<dyn MavenRuntime>, RuntimeError> {
        self.default_runtime
            .as_deref()
            .and_then(|id| self.runtime(id))
            .or_else(|| self.runtimes.values().next().cloned())
            .ok_or(RuntimeError::NoRuntime)
    }

    /// Select the runtime named by the configuration, falling back to the default
    pub fn runtime_for(
        &self,
        config: &LaunchConfiguration,
    ) -> Result<Arc<dyn MavenRuntime>, RuntimeError> {
        match config.string_opt(keys::RUNTIME) {
            Some(id) if !id.trim().is_empty() => match self.runtime(id.trim()) {
                Some(runtime) => Ok(runtime),
                None => {
                    log::warn!("Unknown Maven runtime '{}', using the default runtime", id);
                    self.default_runtime()
                }
            },
            _ => self.default_runtime(),
        }
    }
}
