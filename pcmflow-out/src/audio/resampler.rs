//! Audio resampling using rubato
//!
//! Used by the cpal device when buffers arrive at a different rate than the
//! device stream runs at. One resampler lives for the whole stream so the
//! filter state carries from one buffer into the next.

use crate::audio::device::DeviceError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::{debug, trace};

/// Frames fed to rubato per call
const CHUNK_FRAMES: usize = 256;

/// Streaming resampler for one input rate and channel count.
///
/// Input that does not fill a whole chunk is held back until the next call.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    input_rate: u32,
    channels: usize,
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self, DeviceError> {
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(DeviceError::InvalidValue);
        }

        let resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| DeviceError::Backend {
            code: 0,
            message: format!("Failed to create resampler: {}", e),
        })?;

        debug!(
            "Resampling {}Hz -> {}Hz ({} channels)",
            input_rate, output_rate, channels
        );
        Ok(Self {
            resampler,
            input_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    /// True when this resampler can take input at `input_rate` with `channels`
    pub fn matches(&self, input_rate: u32, channels: usize) -> bool {
        self.input_rate == input_rate && self.channels == channels
    }

    /// Input frames held back for the next call
    pub fn pending_frames(&self) -> usize {
        self.pending[0].len()
    }

    /// Resample interleaved `input`, returning every whole chunk it completes
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, DeviceError> {
        for frame in input.chunks_exact(self.channels) {
            for (channel, &sample) in self.pending.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        let mut output = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending_frames() < needed {
                break;
            }

            let chunk: Vec<&[f32]> = self.pending.iter().map(|ch| &ch[..needed]).collect();
            let planar = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| DeviceError::Backend {
                    code: 0,
                    message: format!("Resampling failed: {}", e),
                })?;
            interleave_into(&planar, &mut output);

            for channel in &mut self.pending {
                channel.drain(..needed);
            }
        }

        trace!(
            "Resampled {} frames in, {} out, {} pending",
            input.len() / self.channels,
            output.len() / self.channels,
            self.pending_frames()
        );
        Ok(output)
    }
}

fn interleave_into(planar: &[Vec<f32>], out: &mut Vec<f32>) {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    out.reserve(frames * planar.len());
    for i in 0..frames {
        for channel in planar {
            out.push(channel[i]);
        }
    }
}
