//! # pcmflow common library
//!
//! Shared code for the pcmflow crates:
//! - Bootstrap configuration (TOML file with layered path resolution)
//! - Logging initialisation
//! - Common error type

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AudioSettings, ConfigResolver, LoggingConfig, TomlConfig};
pub use error::{Error, Result};
