//! Configuration handling for the tessera CLI.
//!
//! Loaded from a TOML file in the XDG config directory (overridable with
//! `TESSERA_CONFIG_DIR` or `--config`); every section falls back to its
//! defaults so an empty file is valid.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use tessera_core::{ChunkerConfig, Error, StorageAdapter};
use tessera_store::{FilesystemAdapter, FilesystemConfig, MemoryAdapter};

#[cfg(feature = "mongodb")]
use tessera_store::{MongoAdapter, MongoConfig};
#[cfg(feature = "redis")]
use tessera_store::{RedisAdapter, RedisConfig};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chunking configuration
    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend selection plus per-backend sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// One of `memory`, `filesystem`, `redis`, `mongodb`.
    pub backend: String,

    pub filesystem: FilesystemConfig,

    #[cfg(feature = "redis")]
    pub redis: RedisConfig,

    #[cfg(feature = "mongodb")]
    pub mongodb: MongoConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            filesystem: FilesystemConfig::default(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::default(),
            #[cfg(feature = "mongodb")]
            mongodb: MongoConfig::default(),
        }
    }
}

fn default_backend() -> String {
    "filesystem".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when no
    /// file exists.
    pub fn load() -> Result<Self, Error> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(Some(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    /// Path of the config file, if a config directory can be determined.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("TESSERA_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.toml"));
        }
        ProjectDirs::from("", "", "tessera")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// A commented sample configuration file.
    #[must_use]
    pub fn sample_toml() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# failed to render sample config\n"))
    }

    /// Build the configured storage adapter.
    pub async fn build_adapter(&self) -> Result<Arc<dyn StorageAdapter>, Error> {
        match self.storage.backend.as_str() {
            "memory" => Ok(Arc::new(MemoryAdapter::new())),
            "filesystem" => {
                let adapter = FilesystemAdapter::connect(self.storage.filesystem.clone()).await?;
                Ok(adapter)
            }
            #[cfg(feature = "redis")]
            "redis" => Ok(RedisAdapter::connect(self.storage.redis.clone())),
            #[cfg(feature = "mongodb")]
            "mongodb" => Ok(MongoAdapter::connect(self.storage.mongodb.clone())),
            other => Err(Error::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::OptimizationLevel;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, "filesystem");
        assert_eq!(config.chunker.max_chunk_size, 30_720);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.backend, "filesystem");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let raw = r#"
            [chunker]
            maxChunkSize = 4096
            optimizationLevel = "none"

            [storage]
            backend = "memory"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.chunker.max_chunk_size, 4096);
        assert_eq!(config.chunker.optimization_level, OptimizationLevel::None);
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = Config::sample_toml();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.storage.backend, Config::default().storage.backend);
    }

    #[tokio::test]
    async fn test_build_memory_adapter() {
        let config: Config = toml::from_str("[storage]\nbackend = \"memory\"").unwrap();
        let adapter = config.build_adapter().await.unwrap();
        assert_eq!(adapter.name(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let config: Config = toml::from_str("[storage]\nbackend = \"sqlite\"").unwrap();
        assert!(config.build_adapter().await.is_err());
    }
}
