//! Classworlds launcher configuration (`m2.conf`)
//!
//! The descriptor collects classpath entries per realm and serializes them in
//! the line-oriented format read by `org.codehaus.classworlds.Launcher`:
//!
//! ```text
//! main is org.apache.maven.cli.MavenCli from plexus.core
//!
//! [plexus.core]
//!   load /opt/maven/lib/maven-core.jar
//! ```
//!
//! The [`LAUNCHER_REALM`] is never written. Its entries form the `-classpath`
//! of the spawned JVM instead.

use indexmap::IndexMap;
use std::io::Write;
use std::path::Path;

/// Realm holding the bootstrap classpath of the spawned JVM
pub const LAUNCHER_REALM: &str = "]launcher";

/// In-memory realm descriptor, built fresh for every launch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LauncherConfiguration {
    main_type: Option<String>,
    main_realm: Option<String>,
    realms: IndexMap<String, Vec<String>>,
}

impl LauncherConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry point the bootstrap launcher hands control to
    pub fn set_main_type(&mut self, main_type: impl Into<String>, main_realm: impl Into<String>) {
        let main_realm = main_realm.into();
        self.add_realm(&main_realm);
        self.main_type = Some(main_type.into());
        self.main_realm = Some(main_realm);
    }

    pub fn main_type(&self) -> Option<&str> {
        self.main_type.as_deref()
    }

    /// Declare a realm without adding entries to it
    pub fn add_realm(&mut self, realm: &str) {
        if !self.realms.contains_key(realm) {
            self.realms.insert(realm.to_string(), Vec::new());
        }
    }

    /// Append an archive (jar) entry to a realm
    pub fn add_archive_entry(&mut self, realm: &str, entry: impl AsRef<Path>) {
        let entry = entry.as_ref().to_string_lossy().into_owned();
        self.push(realm, entry);
    }

    /// Append a directory entry to a realm
    pub fn add_project_entry(&mut self, realm: &str, dir: impl AsRef<Path>) {
        let mut entry = dir.as_ref().to_string_lossy().into_owned();
        // classworlds only treats entries ending with a separator as directories
        if !entry.ends_with('/') && !entry.ends_with(std::path::MAIN_SEPARATOR) {
            entry.push('/');
        }
        self.push(realm, entry);
    }

    fn push(&mut self, realm: &str, entry: String) {
        log::trace!("m2.conf [{}] += {}", realm, entry);
        self.realms.entry(realm.to_string()).or_default().push(entry);
    }

    /// Ordered entries of a realm (empty if the realm is unknown)
    pub fn realm_entries(&self, realm: &str) -> &[String] {
        self.realms.get(realm).map(Vec::as_slice).unwrap_or_default()
    }

    /// Realm names in insertion order
    pub fn realm_names(&self) -> impl Iterator<Item = &str> {
        self.realms.keys().map(String::as_str)
    }

    /// Serialize the descriptor, skipping the launcher realm
    pub fn save<W: Write>(&self, mut out: W) -> Result<(), LauncherConfigError> {
        let (main_type, main_realm) = match (&self.main_type, &self.main_realm) {
            (Some(t), Some(r)) => (t, r),
            _ => return Err(LauncherConfigError::MissingMainType),
        };

        writeln!(out, "main is {} from {}", main_type, main_realm)?;

        for (realm, entries) in &self.realms {
            if realm == LAUNCHER_REALM {
                continue;
            }
            writeln!(out)?;
            writeln!(out, "[{}]", realm)?;
            for entry in entries {
                writeln!(out, "  load {}", entry)?;
            }
        }

        out.flush()?;
        Ok(())
    }
}

/// Errors that can occur while writing a launcher configuration
#[derive(Debug, thiserror::Error)]
pub enum LauncherConfigError {
    #[error("Main type is not set")]
    MissingMainType,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(conf: &LauncherConfiguration) -> String {
        let mut buf = Vec::new();
        conf.save(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_save_format() {
        let mut conf = LauncherConfiguration::new();
        conf.set_main_type("org.apache.maven.cli.MavenCli", "plexus.core");
        conf.add_archive_entry("plexus.core", "/opt/maven/lib/a.jar");
        conf.add_archive_entry("plexus.core", "/opt/maven/lib/b.jar");
        conf.add_project_entry("extensions", "/ws/ext/target/classes");

        assert_eq!(
            render(&conf),
            "main is org.apache.maven.cli.MavenCli from plexus.core\n\
             \n\
             [plexus.core]\n\
             \x20 load /opt/maven/lib/a.jar\n\
             \x20 load /opt/maven/lib/b.jar\n\
             \n\
             [extensions]\n\
             \x20 load /ws/ext/target/classes/\n"
        );
    }

    #[test]
    fn test_launcher_realm_is_not_written() {
        let mut conf = LauncherConfiguration::new();
        conf.add_archive_entry(LAUNCHER_REALM, "/opt/maven/boot/classworlds.jar");
        conf.set_main_type("Main", "core");

        let text = render(&conf);
        assert!(!text.contains("classworlds.jar"));
        assert!(!text.contains(LAUNCHER_REALM));
        assert_eq!(
            conf.realm_entries(LAUNCHER_REALM),
            ["/opt/maven/boot/classworlds.jar".to_string()]
        );
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut conf = LauncherConfiguration::new();
        conf.add_archive_entry(LAUNCHER_REALM, "first.jar");
        conf.add_archive_entry("core", "x.jar");
        conf.add_archive_entry(LAUNCHER_REALM, "second.jar");

        assert_eq!(conf.realm_entries(LAUNCHER_REALM), ["first.jar", "second.jar"]);
        assert_eq!(conf.realm_names().collect::<Vec<_>>(), vec![LAUNCHER_REALM, "core"]);
        assert!(conf.realm_entries("unknown").is_empty());
    }

    #[test]
    fn test_save_requires_main_type() {
        let conf = LauncherConfiguration::new();
        let result = conf.save(Vec::new());
        assert!(matches!(result, Err(LauncherConfigError::MissingMainType)));
    }
}
