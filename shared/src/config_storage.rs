//! Configuration storage for rig calibration data.
//!
//! All config is stored in ~/.mirror_config/ by default.

use std::path::{Path, PathBuf};

use crate::rig_config::{ConfigError, RigConfig};

/// Configuration storage manager for rig configuration files.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.mirror_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.mirror_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".mirror_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// One rig per machine - stored at ~/.mirror_config/rig.json
    pub fn rig_config_path(&self) -> PathBuf {
        self.root_path.join("rig.json")
    }

    /// Get the rig configuration.
    ///
    /// Returns None if no configuration has been saved.
    /// Returns Some(Err) if the file exists but cannot be loaded.
    pub fn get_rig_config(&self) -> Option<Result<RigConfig, ConfigError>> {
        let path = self.rig_config_path();

        if !path.exists() {
            return None;
        }

        Some(RigConfig::load_from_file(&path))
    }

    /// Save the rig configuration.
    ///
    /// Creates the config directory if it doesn't exist.
    /// Returns the path where the configuration was saved.
    pub fn save_rig_config(&self, config: &RigConfig) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.rig_config_path();
        config.save_to_file(&path)?;
        log::info!("Saved rig config to {}", path.display());
        Ok(path)
    }

    /// Delete the rig configuration.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete_rig_config(&self) -> std::io::Result<bool> {
        let path = self.rig_config_path();

        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig_config::RigVariant;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ConfigStorage::with_path(dir.path().join("cfg"));
        assert!(storage.get_rig_config().is_none());
        assert!(!storage.delete_rig_config().unwrap());
    }

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ConfigStorage::with_path(dir.path().join("cfg"));

        let path = storage.save_rig_config(&RigConfig::four_axis()).unwrap();
        assert!(path.starts_with(storage.root_path()));

        let loaded = storage.get_rig_config().unwrap().unwrap();
        assert_eq!(loaded.variant, RigVariant::FourAxis);

        assert!(storage.delete_rig_config().unwrap());
        assert!(storage.get_rig_config().is_none());
    }

    #[test]
    fn test_corrupt_config_is_some_err() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ConfigStorage::with_path(dir.path().to_path_buf());
        std::fs::write(storage.rig_config_path(), "{ not json").unwrap();

        assert!(matches!(
            storage.get_rig_config(),
            Some(Err(ConfigError::Json(_)))
        ));
    }
}
