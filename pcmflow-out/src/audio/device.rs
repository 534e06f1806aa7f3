//! Queued-buffer device interface
//!
//! The stream loop talks to the output device through [`PlaybackDevice`]: it
//! fills numbered device buffers, queues them on the device's single playback
//! source, and later unqueues the ones the device has finished playing.
//! [`AudioHost`] opens the device at stream start.
//!
//! Implementations must be internally synchronized: the stream thread and the
//! owner's control calls (volume, mute, teardown) share one device handle.

use crate::audio::types::Payload;
use crate::error::Result;
use std::sync::Arc;
use thiserror::Error;

/// Device-side buffer handle
pub type BufferId = u32;

/// Playback state of the device source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Never started
    Initial,
    Playing,
    /// Stopped explicitly or by running out of queued buffers
    Stopped,
}

/// Errors reported by device calls
///
/// Only [`DeviceError::FormatUnsupported`] is recoverable by changing what is
/// submitted; everything else is logged and the cycle moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The device does not accept this sample format
    #[error("sample format not supported by device")]
    FormatUnsupported,

    /// Unknown buffer or source handle
    #[error("invalid buffer or source name")]
    InvalidName,

    /// A value was out of range
    #[error("invalid value")]
    InvalidValue,

    /// The call is not valid in the current state
    #[error("invalid operation")]
    InvalidOperation,

    #[error("out of memory")]
    OutOfMemory,

    /// Backend-specific failure
    #[error("backend error {code}: {message}")]
    Backend { code: u32, message: String },
}

impl DeviceError {
    /// Numeric code reported in diagnostics
    pub fn code(&self) -> u32 {
        match self {
            DeviceError::InvalidName => 0xA001,
            DeviceError::FormatUnsupported => 0xA002,
            DeviceError::InvalidValue => 0xA003,
            DeviceError::InvalidOperation => 0xA004,
            DeviceError::OutOfMemory => 0xA005,
            DeviceError::Backend { code, .. } => *code,
        }
    }

    /// Symbolic code name reported in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            DeviceError::InvalidName => "INVALID_NAME",
            DeviceError::FormatUnsupported => "INVALID_ENUM",
            DeviceError::InvalidValue => "INVALID_VALUE",
            DeviceError::InvalidOperation => "INVALID_OPERATION",
            DeviceError::OutOfMemory => "OUT_OF_MEMORY",
            DeviceError::Backend { .. } => "UNKNOWN_ERROR",
        }
    }

    pub fn is_format_unsupported(&self) -> bool {
        matches!(self, DeviceError::FormatUnsupported)
    }
}

/// Result type for device calls
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Log a failed device call with its operation name and device code
pub fn log_device_error(operation: &str, err: &DeviceError) {
    tracing::error!(
        "Error {}: {:08x} {} ({})",
        operation,
        err.code(),
        err.kind_name(),
        err
    );
}

/// An opened output device with one playback source
pub trait PlaybackDevice: Send + Sync {
    /// Driver / renderer identity string
    fn renderer(&self) -> String;

    /// Allocate `count` device buffers
    fn generate_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>>;

    /// Release device buffers
    fn delete_buffers(&self, ids: &[BufferId]) -> DeviceResult<()>;

    /// Store `payload` in buffer `id`; `sample_rate` is the payload's rate
    fn buffer_data(
        &self,
        id: BufferId,
        payload: Payload<'_>,
        sample_rate: u32,
    ) -> DeviceResult<()>;

    /// Append a filled buffer to the source queue
    fn queue_buffer(&self, id: BufferId) -> DeviceResult<()>;

    /// Number of queued buffers the device has finished playing
    fn processed_buffers(&self) -> DeviceResult<usize>;

    /// Remove up to `count` processed buffers from the queue, oldest first
    fn unqueue_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>>;

    fn source_state(&self) -> SourceState;

    /// Start or resume playback of the queue
    fn play(&self) -> DeviceResult<()>;

    /// Stop playback; every queued buffer becomes processed
    fn stop(&self) -> DeviceResult<()>;

    /// Drop all buffers from the source queue
    fn detach_buffers(&self) -> DeviceResult<()>;

    /// Set source gain (1.0 = unity)
    fn set_gain(&self, gain: f32);

    /// Destroy the playback context and close the device
    fn close(&self);
}

/// Opens output devices
pub trait AudioHost: Send + Sync {
    /// Name of the default output device, `None` when no device exists
    fn default_device_name(&self) -> Option<String>;

    /// Open `device` and create a playback context streaming at `sample_rate`
    fn open(&self, device: &str, sample_rate: u32) -> Result<Arc<dyn PlaybackDevice>>;
}
