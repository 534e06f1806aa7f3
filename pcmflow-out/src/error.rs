//! Error types for pcmflow-out
//!
//! Start-time failures are reported through [`Error`]; steady-state device
//! failures use [`DeviceError`](crate::audio::DeviceError) and never stop the
//! stream loop.

use crate::audio::DeviceError;
use thiserror::Error;

/// Main error type for pcmflow-out
#[derive(Error, Debug)]
pub enum Error {
    /// No output device is available
    #[error("No sound devices found")]
    NoDevice,

    /// The output device could not be opened
    #[error("Can't open device {device}: {reason}")]
    DeviceOpen { device: String, reason: String },

    /// A playback context could not be created on the opened device
    #[error("Can't create context for device {device}: {reason}")]
    ContextCreation { device: String, reason: String },

    /// Device buffers or the playback source could not be allocated
    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(DeviceError),

    /// The stream is already running
    #[error("Audio stream already running")]
    AlreadyRunning,

    /// The stream thread could not be spawned
    #[error("Failed to spawn stream thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] pcmflow_common::Error),
}

/// Convenience Result type using pcmflow-out Error
pub type Result<T> = std::result::Result<T, Error>;
