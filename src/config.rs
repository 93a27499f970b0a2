//! Configuration for tutor-store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Default base directory
pub fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tutor-store")
}

/// Where submission and admin logs are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackendKind {
    /// One append-only text file per user and log
    #[default]
    File,
    /// One sled tree per user and log
    Sled,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of all server-side state
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Backend for submission/admin logs
    #[serde(default)]
    pub log_backend: LogBackendKind,

    /// File name of the exercise package archive under `public/`
    #[serde(default = "default_package_archive")]
    pub package_archive: String,

    /// Archive entry whose first line is the package build timestamp
    #[serde(default = "default_package_metadata_entry")]
    pub package_metadata_entry: String,
}

fn default_package_archive() -> String {
    "exercises.zip".to_string()
}

fn default_package_metadata_entry() -> String {
    "config.txt".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            log_backend: LogBackendKind::File,
            package_archive: default_package_archive(),
            package_metadata_entry: default_package_metadata_entry(),
        }
    }
}

impl Config {
    /// Config rooted at `base_dir` with every other field defaulted
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            StoreError::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Draft answers: `answers/<user>/<package>/<problem_set>/<exercise>`
    pub fn answers_dir(&self) -> PathBuf {
        self.data_dir().join("answers")
    }

    /// Per-user logs and submitted code snapshots
    pub fn submissions_dir(&self) -> PathBuf {
        self.data_dir().join("submissions")
    }

    /// Canonical exercise table
    pub fn catalog_path(&self) -> PathBuf {
        self.submissions_dir().join("tutorial_hashes")
    }

    /// Superseded hash -> replacement mapping (JSON)
    pub fn hash_mappings_path(&self) -> PathBuf {
        self.submissions_dir().join("tutorial_hash_mappings")
    }

    pub fn user_info_path(&self) -> PathBuf {
        self.data_dir().join("user_info")
    }

    pub fn version_path(&self) -> PathBuf {
        self.base_dir.join("version")
    }

    pub fn package_archive_path(&self) -> PathBuf {
        self.base_dir.join("public").join(&self.package_archive)
    }

    /// sled database used when `log_backend = "sled"`
    pub fn log_db_path(&self) -> PathBuf {
        self.data_dir().join("logs.sled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
base_dir = "/srv/tutor"
log_backend = "sled"
"#,
        )
        .unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/srv/tutor"));
        assert_eq!(config.log_backend, LogBackendKind::Sled);
        assert_eq!(config.package_metadata_entry, "config.txt");
        assert_eq!(
            config.catalog_path(),
            PathBuf::from("/srv/tutor/data/submissions/tutorial_hashes")
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config::with_base_dir(temp_dir.path());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.base_dir, config.base_dir);
        assert_eq!(loaded.log_backend, LogBackendKind::File);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "log_backend = \"tape\"").unwrap();

        assert!(matches!(Config::load(&path), Err(StoreError::Config(_))));
    }
}
