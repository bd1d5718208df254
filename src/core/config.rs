//! Configuration management for upload-inspector.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Analysis limits
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Batch scan settings
    #[serde(default)]
    pub scan: ScanConfig,
    /// Scan record storage
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigSave(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from default location, or create default if not exists.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path).and_then(|c| c.validate().map(|_| c)) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                    return Self::default();
                }
            }
        }

        let config = Self::default();

        if let Err(e) = config.save(&config_path) {
            log::warn!("Failed to save default config: {}", e);
        }

        config
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("upload-inspector")
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.scan.workers == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.workers".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.scan.job_timeout_secs == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.job_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if crate::utils::logging::parse_level(&self.logging.log_level).is_none() {
            return Err(Error::ConfigInvalid {
                field: "logging.log_level".to_string(),
                message: "Must be one of trace, debug, info, warn, error".to_string(),
            });
        }

        Ok(())
    }
}

/// Limits applied to each analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Refuse files larger than this size (MB). 0 disables the guard.
    pub max_file_size_mb: u64,
}

impl AnalysisConfig {
    /// The size guard in bytes, if enabled.
    pub fn max_file_size_bytes(&self) -> Option<u64> {
        (self.max_file_size_mb > 0).then(|| self.max_file_size_mb.saturating_mul(1024 * 1024))
    }
}

/// Batch scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of files analysed concurrently
    pub workers: usize,
    /// Wall-clock budget per file (seconds)
    pub job_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            job_timeout_secs: 60,
        }
    }
}

/// Scan record storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite scan database
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Get the effective database path.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("scans.db"))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable verbose console output
    pub verbose_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            verbose_console: false,
        }
    }
}

/// Get the number of CPUs, with a reasonable default.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.max_file_size_bytes(), None);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.analysis.max_file_size_mb = 16;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.analysis.max_file_size_mb, 16);
        assert_eq!(loaded.analysis.max_file_size_bytes(), Some(16 * 1024 * 1024));
        assert_eq!(loaded.scan.job_timeout_secs, config.scan.job_timeout_secs);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "analysis": { "max_file_size_mb": 2 } }"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.analysis.max_file_size_mb, 2);
        assert_eq!(loaded.logging.log_level, "info");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial_section.json");
        std::fs::write(
            &path,
            r#"{ "scan": { "workers": 2 }, "analysis": { "max_file_size_mb": 5 } }"#,
        )
        .unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.scan.workers, 2);
        assert_eq!(loaded.scan.job_timeout_secs, ScanConfig::default().job_timeout_secs);
        assert_eq!(loaded.analysis.max_file_size_bytes(), Some(5 * 1024 * 1024));

        std::fs::write(&path, r#"{ "logging": { "verbose_console": true } }"#).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert!(loaded.logging.verbose_console);
        assert_eq!(loaded.logging.log_level, "info");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.scan.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
