//! Configuration file handling for ~/.zetamachine/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::defaults::MIN_TOUCH_INTERVAL;
use super::settings::ConfigFile;

use crate::broker::{MemoryBrokerConfig, Transport};
use crate::compute::{ComputeError, EscapeConfig, Iterations};
use crate::coord::MAX_ZOOM;
use crate::lease::LeaseManager;
use crate::roles::{GenerateConfig, RequestConfig, StoreConfig, DEFAULT_REQUEUE_DELAY};
use crate::store::TileStore;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

fn invalid(section: &str, key: &str, value: impl ToString, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.zetamachine/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path, then apply environment
    /// overrides.
    ///
    /// If the file doesn't exist, starts from defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let mut config = if path.exists() {
            let ini = Ini::load_from_file(path)?;
            super::parser::parse_ini(&ini)?
        } else {
            Self::default()
        };
        super::parser::apply_env(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
            }
        }

        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// The commented INI text `save_to` writes.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Rejects settings no process could start with.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        let compute = &self.compute;
        if let Err(e) = self.escape_config().validate() {
            let (key, value) = match e {
                ComputeError::IterationWidth { .. } => ("max_iterations", compute.max_iterations.to_string()),
                _ if !(compute.escape_radius > 0.0) => ("escape_radius", compute.escape_radius.to_string()),
                _ => ("epsilon", compute.epsilon.to_string()),
            };
            return Err(invalid("compute", key, value, e.to_string()));
        }
        if compute.max_iterations == 0 {
            let limit = u32::from(Iterations::MAX) - 2;
            return Err(invalid("compute", "max_iterations", 0, format!("must be between 1 and {}", limit)));
        }
        if compute.tile_width == 0 || !compute.tile_width.is_power_of_two() {
            return Err(invalid(
                "compute",
                "tile_width",
                compute.tile_width,
                "must be a power of two",
            ));
        }
        if compute.chunks_per_thread == 0 {
            return Err(invalid("compute", "chunks_per_thread", 0, "must be at least 1"));
        }
        if !compute.backend.is_available() {
            return Err(invalid(
                "compute",
                "backend",
                compute.backend,
                "no accelerator is linked into this build (enable the `cuda` feature)",
            ));
        }

        let broker = &self.broker;
        if broker.transport == Transport::Nsq {
            if !broker.transport.is_available() {
                return Err(invalid(
                    "broker",
                    "transport",
                    broker.transport,
                    "NSQ support is not compiled in (enable the `nsq` feature)",
                ));
            }
            if broker.lookupd.trim().is_empty() {
                return Err(invalid("broker", "lookupd", "", "required for the nsq transport"));
            }
            if broker.nsqd.trim().is_empty() {
                return Err(invalid("broker", "nsqd", "", "required for the nsq transport"));
            }
        }
        if broker.max_message_size == 0 {
            return Err(invalid("broker", "max_message_size", 0, "must be greater than zero"));
        }

        let generate = &self.generate;
        if generate.max_in_flight == 0 {
            return Err(invalid("generate", "max_in_flight", 0, "must be at least 1"));
        }
        if generate.touch_interval < MIN_TOUCH_INTERVAL {
            return Err(invalid(
                "generate",
                "touch_interval",
                super::size::format_duration(generate.touch_interval),
                "must be at least 1s",
            ));
        }
        if broker.transport == Transport::Memory && generate.touch_interval >= broker.message_timeout {
            return Err(invalid(
                "generate",
                "touch_interval",
                super::size::format_duration(generate.touch_interval),
                "must be shorter than broker.message_timeout",
            ));
        }

        let request = &self.request;
        if request.max_zoom > MAX_ZOOM {
            return Err(invalid(
                "request",
                "max_zoom",
                request.max_zoom,
                format!("must be at most {}", MAX_ZOOM),
            ));
        }
        if request.min_zoom > request.max_zoom {
            return Err(invalid(
                "request",
                "min_zoom",
                request.min_zoom,
                format!("must not exceed max_zoom ({})", request.max_zoom),
            ));
        }

        Ok(())
    }

    /// Escape iteration settings.
    pub fn escape_config(&self) -> EscapeConfig {
        EscapeConfig {
            epsilon: self.compute.epsilon,
            escape_radius: self.compute.escape_radius,
            max_iterations: self.compute.max_iterations,
        }
    }

    /// The tile store rooted at `store.root`.
    pub fn tile_store(&self) -> TileStore {
        TileStore::new(&self.store.root).with_preview(self.store.preview)
    }

    /// Lease manager over [`tile_store`](Self::tile_store).
    pub fn lease_manager(&self) -> LeaseManager {
        LeaseManager::new(self.tile_store(), self.lease.max_age)
    }

    pub fn memory_broker_config(&self) -> MemoryBrokerConfig {
        MemoryBrokerConfig {
            max_message_size: self.broker.max_message_size,
            message_timeout: self.broker.message_timeout,
        }
    }

    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            min_zoom: self.request.min_zoom,
            max_zoom: self.request.max_zoom,
            core_only: self.request.core_only,
            unit: self.request.unit,
        }
    }

    pub fn generate_config(&self) -> GenerateConfig {
        GenerateConfig {
            tile_width: self.compute.tile_width,
            max_in_flight: self.generate.max_in_flight,
            touch_interval: self.generate.touch_interval,
            shutdown_grace: self.generate.shutdown_grace,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_in_flight: self.store_worker.max_in_flight,
            shutdown_grace: self.store_worker.shutdown_grace,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }
}

/// Get the path to the config directory (~/.zetamachine).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".zetamachine")
}

/// Get the path to the config file (~/.zetamachine/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::BackendKind;
    use std::time::Duration;
    use tempfile::TempDir;

    fn field(err: ConfigFileError) -> (String, String) {
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => (section, key),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ConfigFile::default();
        config.validate().unwrap();
        assert_eq!(config.compute.max_iterations, 5000);
        assert_eq!(config.lease.max_age, Duration::from_secs(24 * 3600));
        assert_eq!(config.broker.transport, Transport::Memory);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp_dir.path().join("missing.ini")).unwrap();
        assert_eq!(config.compute, ConfigFile::default().compute);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.compute.tile_width = 64;
        config.lease.max_age = Duration::from_secs(3600);
        config.request.max_zoom = 7;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.compute.tile_width, 64);
        assert_eq!(loaded.lease.max_age, Duration::from_secs(3600));
        assert_eq!(loaded.request.max_zoom, 7);
    }

    #[test]
    fn test_iteration_width_rejected() {
        let mut config = ConfigFile::default();
        config.compute.max_iterations = 70_000;
        assert_eq!(
            field(config.validate().unwrap_err()),
            ("compute".into(), "max_iterations".into())
        );

        config.compute.max_iterations = u32::from(u16::MAX) - 2;
        config.validate().unwrap();
    }

    #[test]
    fn test_escape_settings_rejected() {
        let mut config = ConfigFile::default();
        config.compute.epsilon = -1.0;
        assert_eq!(field(config.validate().unwrap_err()).1, "epsilon");

        let mut config = ConfigFile::default();
        config.compute.escape_radius = 0.0;
        assert_eq!(field(config.validate().unwrap_err()).1, "escape_radius");
    }

    #[test]
    fn test_tile_width_power_of_two() {
        let mut config = ConfigFile::default();
        config.compute.tile_width = 100;
        assert_eq!(field(config.validate().unwrap_err()).1, "tile_width");
        config.compute.tile_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zoom_band_checked() {
        let mut config = ConfigFile::default();
        config.request.min_zoom = 5;
        config.request.max_zoom = 3;
        assert_eq!(field(config.validate().unwrap_err()).1, "min_zoom");

        config.request.min_zoom = 0;
        config.request.max_zoom = MAX_ZOOM + 1;
        assert_eq!(field(config.validate().unwrap_err()).1, "max_zoom");
    }

    #[test]
    fn test_touch_interval_checked() {
        let mut config = ConfigFile::default();
        config.generate.touch_interval = Duration::ZERO;
        assert_eq!(field(config.validate().unwrap_err()).1, "touch_interval");

        config.generate.touch_interval = config.broker.message_timeout;
        assert_eq!(field(config.validate().unwrap_err()).1, "touch_interval");
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_accelerator_requires_feature() {
        let mut config = ConfigFile::default();
        config.compute.backend = BackendKind::Accelerator;
        assert_eq!(field(config.validate().unwrap_err()).1, "backend");
    }

    #[cfg(not(feature = "nsq"))]
    #[test]
    fn test_nsq_requires_feature() {
        let mut config = ConfigFile::default();
        config.broker.transport = Transport::Nsq;
        assert_eq!(field(config.validate().unwrap_err()).1, "transport");
    }

    #[cfg(feature = "nsq")]
    #[test]
    fn test_nsq_requires_lookupd() {
        let mut config = ConfigFile::default();
        config.broker.transport = Transport::Nsq;
        config.broker.lookupd = String::new();
        assert_eq!(field(config.validate().unwrap_err()).1, "lookupd");
    }

    #[test]
    fn test_service_settings() {
        let mut config = ConfigFile::default();
        config.compute.tile_width = 32;
        config.store_worker.max_in_flight = 3;

        assert_eq!(config.generate_config().tile_width, 32);
        assert_eq!(config.store_config().max_in_flight, 3);
        assert_eq!(config.request_config().max_zoom, config.request.max_zoom);
        assert_eq!(config.escape_config(), EscapeConfig::default());
    }
}
