//! Configuration for classdex tools.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Tool configuration, loaded from `<home>/config.yaml`.
///
/// The home directory is `$CLASSDEX_HOME` when set, `~/.classdex` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassdexConfig {
    /// Directory for saved index snapshots
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Scanner kinds enabled when none are requested explicitly
    #[serde(default = "default_scanners")]
    pub default_scanners: Vec<String>,

    /// Worker threads for parallel scans (0 = sequential)
    #[serde(default)]
    pub parallel_workers: usize,

    /// Snapshot format: "json" or "msgpack"
    #[serde(default = "default_format")]
    pub format: String,

    /// Include patterns applied to scanned entry names (full-name regexes)
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude patterns applied to scanned entry names (full-name regexes)
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn classdex_home() -> PathBuf {
    if let Ok(home) = std::env::var("CLASSDEX_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".classdex")
}

fn default_storage_dir() -> PathBuf {
    classdex_home().join("indexes")
}

fn default_scanners() -> Vec<String> {
    vec!["SubTypes".to_string(), "TypeAnnotations".to_string()]
}

fn default_format() -> String {
    "json".to_string()
}

impl Default for ClassdexConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            default_scanners: default_scanners(),
            parallel_workers: 0,
            format: default_format(),
            include: vec![],
            exclude: vec![],
        }
    }
}

impl ClassdexConfig {
    /// Load configuration from the home config file, falling back to
    /// defaults when the file is missing or malformed.
    pub fn load() -> Self {
        let config_path = classdex_home().join("config.yaml");

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), error = %e, "ignoring config file");
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| StoreError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| StoreError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Ensure the storage directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.storage_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClassdexConfig::default();
        assert_eq!(config.format, "json");
        assert_eq!(config.parallel_workers, 0);
        assert!(config.default_scanners.contains(&"SubTypes".to_string()));
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "storage_dir: /tmp/cdx\nparallel_workers: 4\nformat: msgpack\n",
        )
        .unwrap();

        let config = ClassdexConfig::load_from(&path).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/cdx"));
        assert_eq!(config.parallel_workers, 4);
        assert_eq!(config.format, "msgpack");
        // Unlisted fields fall back to their defaults.
        assert!(!config.default_scanners.is_empty());
    }

    #[test]
    fn test_malformed_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "storage_dir: [not, a, path\n").unwrap();

        let err = ClassdexConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig { .. }));
    }
}
