//! Capture configuration
//!
//! Configuration loading, validation and serialization. Files may be TOML,
//! JSON or YAML; the format is picked from the extension.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::handshake::EAPOL_KEY_MIN_LEN;
use crate::{CaptureError, Result, MAX_CAPTURE_FILE_SIZE, MAX_EAPOL_LEN};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Output locations and limits
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Output locations and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `handshakes/`, `pmkid/` and `logs/`
    pub output_dir: PathBuf,
    /// Capture file size that triggers rotation (bytes)
    pub max_capture_size: u64,
    /// Longest EAPOL frame kept in a handshake artifact (bytes)
    pub max_eapol_len: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/sd/wavepwn"),
            max_capture_size: MAX_CAPTURE_FILE_SIZE,
            max_eapol_len: MAX_EAPOL_LEN,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether configuration is valid
    pub valid: bool,
    /// Validation errors
    pub errors: Vec<String>,
    /// Validation warnings
    pub warnings: Vec<String>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Serialization format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(CaptureError::Config(format!(
                "Unsupported config file format: {}",
                path.display()
            ))),
        }
    }
}

/// Configuration manager
#[derive(Debug, Default)]
pub struct ConfigManager {
    /// Current configuration
    config: CaptureConfig,
    /// Path to configuration file
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration manager with config
    pub fn with_config(config: CaptureConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        let content = fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("Failed to read config file: {}", e)))?;

        let config: CaptureConfig = match format {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| CaptureError::Config(format!("Failed to parse JSON config: {}", e)))?,
            Format::Toml => toml::from_str(&content)
                .map_err(|e| CaptureError::Config(format!("Failed to parse TOML config: {}", e)))?,
            Format::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| CaptureError::Config(format!("Failed to parse YAML config: {}", e)))?,
        };

        let manager = Self {
            config,
            config_path: Some(path.to_path_buf()),
        };
        manager.ensure_valid(&manager.config)?;
        Ok(manager)
    }

    /// Load configuration from file, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::load_from_file(path)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match Format::from_path(path)? {
            Format::Json => self.to_json()?,
            Format::Toml => self.to_toml()?,
            Format::Yaml => self.to_yaml()?,
        };

        fs::write(path, content)
            .map_err(|e| CaptureError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get current configuration
    pub fn get_config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Consume the manager, returning the configuration
    pub fn into_config(self) -> CaptureConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Update configuration
    pub fn update_config(&mut self, new_config: CaptureConfig) -> Result<()> {
        self.ensure_valid(&new_config)?;
        self.config = new_config;
        Ok(())
    }

    /// Validate configuration
    pub fn validate_config(&self, config: &CaptureConfig) -> ValidationResult {
        let mut result = ValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        // Storage
        if config.storage.output_dir.as_os_str().is_empty() {
            result.errors.push("Output directory cannot be empty".to_string());
        }

        if config.storage.max_capture_size == 0 {
            result.errors.push("Capture rotation size cannot be 0".to_string());
        } else if config.storage.max_capture_size < 1024 * 1024 {
            result.warnings.push(format!(
                "Capture rotation size of {} bytes will produce many small files",
                config.storage.max_capture_size
            ));
        }

        if config.storage.max_eapol_len < EAPOL_KEY_MIN_LEN {
            result.errors.push(format!(
                "Max EAPOL length must be at least {} bytes to hold an EAPOL-Key frame",
                EAPOL_KEY_MIN_LEN
            ));
        }

        // Logging
        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            result.errors.push(format!(
                "Invalid log level '{}', must be one of: {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
            result.errors.push(format!(
                "Invalid log format '{}', must be one of: {}",
                config.logging.format,
                LOG_FORMATS.join(", ")
            ));
        }

        result.valid = result.errors.is_empty();
        result
    }

    fn ensure_valid(&self, config: &CaptureConfig) -> Result<()> {
        let validation = self.validate_config(config);
        if !validation.valid {
            return Err(CaptureError::Config(format!(
                "Configuration validation failed: {}",
                validation.errors.join(", ")
            )));
        }
        Ok(())
    }

    /// Get configuration as JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.config)
            .map_err(|e| CaptureError::Config(format!("Failed to serialize config to JSON: {}", e)))
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.config)
            .map_err(|e| CaptureError::Config(format!("Failed to serialize config to TOML: {}", e)))
    }

    /// Get configuration as YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.config)
            .map_err(|e| CaptureError::Config(format!("Failed to serialize config to YAML: {}", e)))
    }
}
