//! Upstream sample pulling
//!
//! Each cycle asks the mixer for the number of stereo frames the audio timer
//! says are due and converts them to normalized floats for the tempo stage.

use crate::audio::types::{i16_to_f32, STEREO_CHANNELS};
use std::sync::Arc;
use tracing::trace;

/// Most frames pulled from the mixer in one cycle
pub const MAX_FRAMES_PER_CYCLE: usize = 256;

/// Fixed rate of the audio sample domain the timer ratio is expressed in
const AUDIO_DOMAIN_RATE: u64 = 48_000;

/// Upstream producer of interleaved 16-bit stereo samples.
///
/// Called from the stream thread while other threads keep producing, so
/// implementations must not block.
pub trait Mixer: Send + Sync {
    /// Rate of the samples `mix` produces
    fn sample_rate(&self) -> u32;

    /// Write up to `frames` stereo frames into `out`, returning how many were written
    fn mix(&self, out: &mut [i16], frames: usize) -> usize;

    /// Current emulation speed multiplier; may transiently read zero or below
    fn current_speed(&self) -> f64;

    /// Ask the producer to recompute its speed estimate before the next read
    fn request_speed_refresh(&self) {}
}

/// Timer ratio between the emulated clock and the audio sample domain
pub trait AudioClock: Send + Sync {
    fn ticks_per_second(&self) -> u64;

    /// Rate the emulated audio DMA runs at
    fn dma_sample_rate(&self) -> u32;
}

/// Clock with constant parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    pub ticks_per_second: u64,
    pub dma_sample_rate: u32,
}

impl Default for FixedClock {
    fn default() -> Self {
        Self {
            ticks_per_second: 486_000_000,
            dma_sample_rate: 32_000,
        }
    }
}

impl AudioClock for FixedClock {
    fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    fn dma_sample_rate(&self) -> u32 {
        self.dma_sample_rate
    }
}

/// Stereo frames due this cycle, clamped to [`MAX_FRAMES_PER_CYCLE`]
pub fn frames_due(clock: &dyn AudioClock) -> usize {
    let ticks = clock.ticks_per_second();
    let dma_divisor = clock.dma_sample_rate() as u64 * 4 / 32;
    if ticks == 0 || dma_divisor == 0 {
        return MAX_FRAMES_PER_CYCLE;
    }
    let dma_period = ticks / dma_divisor;
    let frames = dma_period * (AUDIO_DOMAIN_RATE * 4) / ticks;
    (frames as usize).min(MAX_FRAMES_PER_CYCLE)
}

/// Pulls frames from the mixer into a float staging buffer
pub struct SampleSource {
    mixer: Arc<dyn Mixer>,
    clock: Arc<dyn AudioClock>,
    raw: Vec<i16>,
    samples: Vec<f32>,
    frames: usize,
}

impl SampleSource {
    pub fn new(mixer: Arc<dyn Mixer>, clock: Arc<dyn AudioClock>) -> Self {
        Self {
            mixer,
            clock,
            raw: vec![0; MAX_FRAMES_PER_CYCLE * STEREO_CHANNELS],
            samples: vec![0.0; MAX_FRAMES_PER_CYCLE * STEREO_CHANNELS],
            frames: 0,
        }
    }

    pub fn mixer(&self) -> &dyn Mixer {
        self.mixer.as_ref()
    }

    /// Pull the frames due this cycle, at most `max_frames`.
    ///
    /// Returns the number of frames the mixer delivered; the normalized
    /// samples are available from [`SampleSource::samples`].
    pub fn pull(&mut self, max_frames: usize) -> usize {
        let requested = frames_due(self.clock.as_ref())
            .min(max_frames)
            .min(MAX_FRAMES_PER_CYCLE);
        let len = requested * STEREO_CHANNELS;

        let delivered = self.mixer.mix(&mut self.raw[..len], requested).min(requested);
        let got = delivered * STEREO_CHANNELS;
        i16_to_f32(&self.raw[..got], &mut self.samples[..got]);
        self.frames = delivered;

        trace!("Pulled {} of {} frames from mixer", delivered, requested);
        delivered
    }

    /// Samples from the last pull, interleaved stereo
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.frames * STEREO_CHANNELS]
    }
}
