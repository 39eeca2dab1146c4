//! Configuration module for LOFT.

use serde::Deserialize;
use std::path::Path;

use crate::{LoftError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/loft.db".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// Which storage backend to use for file bytes.
///
/// Selected once at process start; backends are never mixed per-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Local filesystem under `upload_root`.
    #[default]
    Local,
    /// HTTP blob object store.
    Blob,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend selection: "local" or "blob".
    #[serde(default)]
    pub mode: StorageMode,
    /// Root directory for the local backend. Per-owner trees live below it.
    #[serde(default = "default_upload_root")]
    pub upload_root: String,
    /// Base URL of the blob store (blob mode only).
    #[serde(default)]
    pub blob_endpoint: String,
    /// Bearer token for the blob store (blob mode only).
    ///
    /// Can be injected via the `LOFT_BLOB_TOKEN` environment variable
    /// instead of the config file.
    #[serde(default)]
    pub blob_token: String,
}

fn default_upload_root() -> String {
    "uploads".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            upload_root: default_upload_root(),
            blob_endpoint: String::new(),
            blob_token: String::new(),
        }
    }
}

/// File service limits.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_max_upload_size() -> u64 {
    50
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

impl FilesConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file. Console-only when absent.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// File service limits.
    #[serde(default)]
    pub files: FilesConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(LoftError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable
    /// overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| LoftError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `LOFT_BLOB_TOKEN`: Override the blob store bearer token
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("LOFT_BLOB_TOKEN") {
            if !token.is_empty() {
                self.storage.blob_token = token;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if blob mode is selected without an endpoint and
    /// token.
    pub fn validate(&self) -> Result<()> {
        if self.storage.mode == StorageMode::Blob {
            if self.storage.blob_endpoint.is_empty() {
                return Err(LoftError::Config(
                    "storage mode is 'blob' but blob_endpoint is not set".to_string(),
                ));
            }
            if self.storage.blob_token.is_empty() {
                return Err(LoftError::Config(
                    "storage mode is 'blob' but blob_token is not set. \
                     Set it in the config file or via LOFT_BLOB_TOKEN."
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/loft.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.storage.mode, StorageMode::Local);
        assert_eq!(config.storage.upload_root, "uploads");
        assert_eq!(config.files.max_upload_size_mb, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = Config::parse(
            r#"
            [storage]
            mode = "blob"
            blob_endpoint = "https://blobs.example.com"
            blob_token = "secret"

            [files]
            max_upload_size_mb = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.mode, StorageMode::Blob);
        assert_eq!(config.storage.blob_endpoint, "https://blobs.example.com");
        assert_eq!(config.files.max_upload_size_mb, 5);
        assert_eq!(config.files.max_upload_size_bytes(), 5 * 1024 * 1024);
        // Untouched sections fall back to defaults.
        assert_eq!(config.database.path, "data/loft.db");
    }

    #[test]
    fn test_parse_invalid_mode() {
        let result = Config::parse(
            r#"
            [storage]
            mode = "ftp"
            "#,
        );
        assert!(matches!(result, Err(LoftError::Config(_))));
    }

    #[test]
    fn test_validate_blob_requires_endpoint() {
        let mut config = Config::default();
        config.storage.mode = StorageMode::Blob;
        assert!(matches!(config.validate(), Err(LoftError::Config(_))));

        config.storage.blob_endpoint = "https://blobs.example.com".to_string();
        assert!(matches!(config.validate(), Err(LoftError::Config(_))));

        config.storage.blob_token = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_local_mode_is_lenient() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_string() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.storage.mode, StorageMode::Local);
    }
}
