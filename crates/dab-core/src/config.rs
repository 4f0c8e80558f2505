//! # Configuration
//!
//! YAML configuration for applications embedding the decode layer.
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `DAB_CORE_CONFIG` environment variable
//! 2. `./dab-core.yaml` (current directory)
//! 3. `~/.config/dab-core/config.yaml` (user config, platform specific)
//! 4. `/etc/dab-core/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! transmission_mode: I
//! worker_threads: 4
//!
//! viterbi:
//!   backend: auto
//!
//! slideshow:
//!   capacity: 10
//!
//! logging:
//!   level: info
//!   format: json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fec::viterbi::ViterbiBackend;
use crate::observe::LogConfig;
use crate::params::TransmissionMode;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "DAB_CORE_CONFIG";

/// Error type for configuration operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("config not found: {0}")]
    NotFound(String),
    /// Failed to read or write the configuration file
    #[error("failed to read config: {0}")]
    ReadError(String),
    /// Failed to parse configuration
    #[error("failed to parse config: {0}")]
    ParseError(String),
    /// Invalid configuration value
    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Which Viterbi backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Widest backend the CPU supports
    Auto,
    Scalar,
    Ssse3,
    Avx2,
}

impl Default for BackendPreference {
    fn default() -> Self {
        BackendPreference::Auto
    }
}

/// Viterbi engine settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViterbiConfig {
    pub backend: BackendPreference,
}

impl ViterbiConfig {
    /// Turn the preference into a concrete backend for this CPU.
    pub fn resolve(&self) -> Result<ViterbiBackend, ConfigError> {
        let backend = match self.backend {
            BackendPreference::Auto => return Ok(ViterbiBackend::detect()),
            BackendPreference::Scalar => ViterbiBackend::Scalar,
            BackendPreference::Ssse3 => ViterbiBackend::Ssse3,
            BackendPreference::Avx2 => ViterbiBackend::Avx2,
        };
        if backend.is_supported() {
            Ok(backend)
        } else {
            Err(ConfigError::ValidationError(format!(
                "viterbi backend {} is not supported by this CPU",
                backend
            )))
        }
    }
}

/// Slideshow cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideshowConfig {
    /// Number of images kept per service
    pub capacity: usize,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

/// Complete configuration of one radio instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Transmission mode of the ensemble being received
    pub transmission_mode: TransmissionMode,
    /// Decode worker threads, 0 for one per CPU
    pub worker_threads: usize,
    pub viterbi: ViterbiConfig,
    pub slideshow: SlideshowConfig,
    pub logging: LogConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            transmission_mode: TransmissionMode::I,
            worker_threads: 0,
            viterbi: ViterbiConfig::default(),
            slideshow: SlideshowConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl RadioConfig {
    /// Load configuration from the search path.
    ///
    /// Returns the default config if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            return Self::load_from(&path);
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths, environment variable excluded.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./dab-core.yaml")];

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "dab-core") {
            paths.push(config_dir.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/dab-core/config.yaml"));
        paths
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads > 256 {
            return Err(ConfigError::ValidationError(
                "worker_threads must be at most 256".to_string(),
            ));
        }
        if self.slideshow.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "slideshow.capacity must be > 0".to_string(),
            ));
        }
        self.viterbi.resolve()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{LogFormat, LogLevel};

    #[test]
    fn test_default_config() {
        let config = RadioConfig::default();
        assert_eq!(config.transmission_mode, TransmissionMode::I);
        assert_eq!(config.viterbi.backend, BackendPreference::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
transmission_mode: III
worker_threads: 2
viterbi:
  backend: scalar
slideshow:
  capacity: 4
logging:
  level: debug
  format: json
"#;
        let config = RadioConfig::parse(yaml).unwrap();
        assert_eq!(config.transmission_mode, TransmissionMode::III);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.viterbi.resolve(), Ok(ViterbiBackend::Scalar));
        assert_eq!(config.slideshow.capacity, 4);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = RadioConfig::parse("worker_threads: 3\n").unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.slideshow, SlideshowConfig::default());
    }

    #[test]
    fn test_parse_error() {
        let err = RadioConfig::parse("transmission_mode: V\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = RadioConfig::default();
        config.slideshow.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = RadioConfig::default();
        config.worker_threads = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("dab-core-config-{}.yaml", std::process::id()));
        let mut config = RadioConfig::default();
        config.worker_threads = 5;
        config.transmission_mode = TransmissionMode::II;
        config.save(&path).unwrap();

        let loaded = RadioConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = RadioConfig::load_from(Path::new("/nonexistent/dab-core.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }

    #[test]
    fn test_config_search_paths() {
        let paths = RadioConfig::config_search_paths();
        assert!(paths[0].ends_with("dab-core.yaml"));
        assert!(paths.last().unwrap().starts_with("/etc"));
    }
}
