//! File system paths for the daemon.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths for the daemon.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.outpost)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.outpost`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;
        Ok(Self {
            base_dir: home.join(".outpost"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Config file path (~/.outpost/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Database file path (~/.outpost/outpost.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("outpost.sqlite")
    }

    /// Logs directory (~/.outpost/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().expect("Failed to determine home directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn custom_base_dir_drives_every_path() {
        let base = PathBuf::from("/tmp/test-outpost");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.database_file(), base.join("outpost.sqlite"));
        assert_eq!(paths.logs_dir(), base.join("logs"));
    }

    #[test]
    fn default_base_dir_is_under_home() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(paths.base_dir(), &home.join(".outpost"));
    }

    #[test]
    fn ensure_dirs_creates_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("outpost");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());
        paths.ensure_dirs().unwrap();
        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());

        paths.ensure_dirs().unwrap();
        assert!(paths.logs_dir().is_dir());
    }
}
