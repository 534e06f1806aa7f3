//! Bootstrap configuration loading and config file resolution
//!
//! The configuration file is optional. A missing file produces a warning and
//! the compiled defaults; a malformed file is an error.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `PCMFLOW_CONFIG` environment variable
//! 3. Per-user config directory (`<config_dir>/pcmflow/config.toml`)
//! 4. `/etc/pcmflow/config.toml` (Linux only)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PCMFLOW_CONFIG";

/// File name looked up in the user and system config directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Largest accepted volume percentage
pub const MAX_VOLUME_PERCENT: u8 = 100;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Audio output settings
    #[serde(default)]
    pub audio: AudioSettings,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Audio output settings
#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    /// Extra device buffers beyond the minimum of two
    #[serde(default = "default_latency")]
    pub latency: u32,

    /// Decode stereo into 5.1 surround before output
    #[serde(default)]
    pub dpl2_decoder: bool,

    /// Initial volume in percent (0..=100)
    #[serde(default = "default_volume")]
    pub volume: u8,

    /// Output device name (system default when absent)
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            latency: default_latency(),
            dpl2_decoder: false,
            volume: default_volume(),
            device: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_latency() -> u32 {
    2
}

fn default_volume() -> u8 {
    MAX_VOLUME_PERCENT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: TomlConfig = toml::from_str(text)?;
        config.validate();
        Ok(config)
    }

    /// Load configuration from `path`
    ///
    /// A missing file is not an error: a warning is logged and defaults are used.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from an optional path, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&mut self) {
        if self.audio.volume > MAX_VOLUME_PERCENT {
            warn!(
                "Configured volume {} exceeds {}, clamping",
                self.audio.volume, MAX_VOLUME_PERCENT
            );
            self.audio.volume = MAX_VOLUME_PERCENT;
        }
        if self.logging.level.trim().is_empty() {
            self.logging.level = default_log_level();
        }
    }
}

/// Locates the configuration file under an application directory name
/// (`<config dir>/<app_dir>/config.toml`, `/etc/<app_dir>/config.toml`)
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_dir: String,
}

impl ConfigResolver {
    pub fn new(app_dir: impl Into<String>) -> Self {
        Self {
            app_dir: app_dir.into(),
        }
    }

    /// Per-user config file path, whether or not it exists
    pub fn user_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_dir).join(CONFIG_FILE_NAME))
    }

    pub fn system_config_path(&self) -> PathBuf {
        Path::new("/etc").join(&self.app_dir).join(CONFIG_FILE_NAME)
    }

    /// Resolve the config file path, or `None` when no candidate exists
    ///
    /// An explicit path (CLI or environment) is returned even when the file
    /// does not exist so the caller can report it.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        if let Some(user_config) = self.user_config_path() {
            if user_config.exists() {
                return Some(user_config);
            }
        }

        if cfg!(target_os = "linux") {
            let system_config = self.system_config_path();
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }
}
