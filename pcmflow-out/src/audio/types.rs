//! Core audio data types
//!
//! Sample formats accepted by the device and the borrowed payloads handed to it.
//!
//! **Format:**
//! - Floating samples are normalized to -1.0..1.0
//! - Integer samples are signed 16-bit
//! - All layouts are interleaved (stereo: L, R; surround: FL, FR, C, LFE, RL, RR)

use std::fmt;

/// Channels in a stereo frame
pub const STEREO_CHANNELS: usize = 2;

/// Channels in a 5.1 surround frame
pub const SURROUND_CHANNELS: usize = 6;

/// Index of the low-frequency channel inside a surround frame
pub const LFE_CHANNEL: usize = 3;

/// Scale between normalized floats and 16-bit integers (2^15)
pub const I16_SCALE: f32 = 32768.0;

/// Device sample format, selected every cycle from the current capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    StereoI16,
    StereoF32,
    SurroundI16,
    SurroundF32,
}

impl OutputFormat {
    pub fn channels(self) -> usize {
        if self.is_surround() {
            SURROUND_CHANNELS
        } else {
            STEREO_CHANNELS
        }
    }

    pub fn is_surround(self) -> bool {
        matches!(self, OutputFormat::SurroundI16 | OutputFormat::SurroundF32)
    }

    pub fn is_float(self) -> bool {
        matches!(self, OutputFormat::StereoF32 | OutputFormat::SurroundF32)
    }

    /// Size of one frame in bytes
    pub fn bytes_per_frame(self) -> usize {
        let sample_bytes = if self.is_float() { 4 } else { 2 };
        self.channels() * sample_bytes
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::StereoI16 => "stereo int16",
            OutputFormat::StereoF32 => "stereo float32",
            OutputFormat::SurroundI16 => "5.1 int16",
            OutputFormat::SurroundF32 => "5.1 float32",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoded samples for one device buffer
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    StereoI16(&'a [i16]),
    StereoF32(&'a [f32]),
    SurroundI16(&'a [i16]),
    SurroundF32(&'a [f32]),
}

impl<'a> Payload<'a> {
    pub fn format(&self) -> OutputFormat {
        match self {
            Payload::StereoI16(_) => OutputFormat::StereoI16,
            Payload::StereoF32(_) => OutputFormat::StereoF32,
            Payload::SurroundI16(_) => OutputFormat::SurroundI16,
            Payload::SurroundF32(_) => OutputFormat::SurroundF32,
        }
    }

    /// Number of interleaved samples
    pub fn len(&self) -> usize {
        match self {
            Payload::StereoI16(s) | Payload::SurroundI16(s) => s.len(),
            Payload::StereoF32(s) | Payload::SurroundF32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.len() / self.format().channels()
    }

    /// Payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.frames() * self.format().bytes_per_frame()
    }

    /// Append the payload as normalized floats to `out`
    pub fn extend_normalized(&self, out: &mut Vec<f32>) {
        match self {
            Payload::StereoI16(s) | Payload::SurroundI16(s) => {
                out.extend(s.iter().map(|&v| v as f32 / I16_SCALE))
            }
            Payload::StereoF32(s) | Payload::SurroundF32(s) => out.extend_from_slice(s),
        }
    }
}

/// Convert 16-bit samples to normalized floats (divide by 2^15)
///
/// Converts `min(input.len(), output.len())` samples.
pub fn i16_to_f32(input: &[i16], output: &mut [f32]) {
    for (out, &sample) in output.iter_mut().zip(input) {
        *out = sample as f32 / I16_SCALE;
    }
}

/// Convert normalized floats to 16-bit samples, replacing the contents of `output`
///
/// Values outside -1.0..1.0 saturate instead of wrapping.
pub fn f32_to_i16(input: &[f32], output: &mut Vec<i16>) {
    output.clear();
    output.extend(
        input
            .iter()
            .map(|&v| (v * I16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16),
    );
}
