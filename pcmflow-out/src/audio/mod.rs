//! Audio output layer
//!
//! Device abstraction, sample formats, and the cpal-backed output device.

pub mod device;
pub mod output;
pub mod resampler;
pub mod types;

pub use device::{
    log_device_error, AudioHost, BufferId, DeviceError, DeviceResult, PlaybackDevice, SourceState,
};
pub use output::{CpalDevice, CpalHost};
pub use types::{OutputFormat, Payload};
