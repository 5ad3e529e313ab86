//! User-declared classpath components

use crate::config::{keys, LaunchConfiguration};
use crate::m2conf::{LauncherConfiguration, LAUNCHER_REALM};
use std::path::Path;

/// Adds user-declared classpath entries to a launcher configuration
pub trait UserComponents: Send + Sync {
    fn add_user_components(&self, config: &LaunchConfiguration, conf: &mut LauncherConfiguration);
}

/// Reads components from the `M2_USER_COMPONENTS` list attribute.
///
/// Each item is either `realm=path` or a bare `path`, which goes to the
/// launcher realm. Paths ending with `/` or naming an existing directory are
/// added as directory entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredComponents;

impl UserComponents for ConfiguredComponents {
    fn add_user_components(&self, config: &LaunchConfiguration, conf: &mut LauncherConfiguration) {
        for item in config.list_or_empty(keys::USER_COMPONENTS) {
            let (realm, path) = match item.split_once('=') {
                Some((realm, path)) => (realm.trim(), path.trim()),
                None => (LAUNCHER_REALM, item.trim()),
            };
            if path.is_empty() {
                log::warn!("Ignoring empty user component '{}'", item);
                continue;
            }

            if path.ends_with('/') || Path::new(path).is_dir() {
                conf.add_project_entry(realm, path);
            } else {
                conf.add_archive_entry(realm, path);
            }
        }
    }
}
