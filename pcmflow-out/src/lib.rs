//! # pcmflow output engine (pcmflow-out)
//!
//! Real-time PCM output streaming: pulls stereo samples from an upstream
//! mixer, time-stretches them to the producer's playback speed, optionally
//! decodes them to 5.1 surround, and streams them to the output device
//! through a fixed ring of queued device buffers.
//!
//! **Architecture:** one dedicated stream thread drives
//! source → tempo → (surround) → buffer ring → device, with a cpal backend
//! implementing the queued-buffer device API.

pub mod audio;
pub mod dsp;
pub mod error;
pub mod stream;
pub mod tone;

pub use error::{Error, Result};
pub use stream::{AudioStream, StreamNotifier, StreamState};
