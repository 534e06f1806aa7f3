//! Passive Dolby Pro Logic II style matrix decoder
//!
//! Expands a stereo stream into 5.1 (FL, FR, C, LFE, RL, RR). The rear
//! channels are recovered from the 90 degree phase-shifted matrix components
//! through a windowed Hilbert FIR; every other path is delayed by the same
//! amount so all six channels stay aligned.

use crate::audio::types::{STEREO_CHANNELS, SURROUND_CHANNELS};
use std::f32::consts::{FRAC_1_SQRT_2, PI};

/// Half-length of the Hilbert FIR; the filter has `2 * HALF_TAPS + 1` taps
const HALF_TAPS: usize = 119;

/// Smallest block the decoder is meant to be driven with
pub const DPL2_MIN_WINDOW: usize = 240;

/// Rear matrix coefficients
const REAR_MAJOR: f32 = 0.8718;
const REAR_MINOR: f32 = 0.4899;

/// LFE lowpass corner
const LFE_CUTOFF_HZ: f32 = 120.0;

/// Stereo to 5.1 decoder working on interleaved float frames
pub trait SurroundDecoder: Send {
    /// Minimum number of frames per decode call for usable output
    fn min_window(&self) -> usize;

    /// Decode interleaved stereo into interleaved 5.1, replacing `out`
    fn decode(&mut self, stereo: &[f32], out: &mut Vec<f32>);

    /// Forget filter history
    fn reset(&mut self);
}

pub struct Dpl2Decoder {
    taps: Vec<f32>,
    /// Last `2 * HALF_TAPS` input frames, interleaved
    history: Vec<f32>,
    work: Vec<f32>,
    lfe_coeff: f32,
    lfe_state: f32,
}

impl Dpl2Decoder {
    pub fn new(sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f32;
        Self {
            taps: hilbert_taps(HALF_TAPS),
            history: vec![0.0; 2 * HALF_TAPS * STEREO_CHANNELS],
            work: Vec::new(),
            lfe_coeff: 1.0 - (-2.0 * PI * LFE_CUTOFF_HZ / rate).exp(),
            lfe_state: 0.0,
        }
    }

    /// Group delay of every output channel, in frames
    pub fn delay_frames(&self) -> usize {
        HALF_TAPS
    }
}

/// Hamming-windowed ideal Hilbert transformer, indexed `0..=2 * half`
fn hilbert_taps(half: usize) -> Vec<f32> {
    let len = 2 * half + 1;
    (0..len)
        .map(|i| {
            let n = i as isize - half as isize;
            if n % 2 == 0 {
                0.0
            } else {
                let ideal = 2.0 / (PI * n as f32);
                let window = 0.54 - 0.46 * (2.0 * PI * i as f32 / (len - 1) as f32).cos();
                ideal * window
            }
        })
        .collect()
}

impl SurroundDecoder for Dpl2Decoder {
    fn min_window(&self) -> usize {
        DPL2_MIN_WINDOW
    }

    fn decode(&mut self, stereo: &[f32], out: &mut Vec<f32>) {
        let frames = stereo.len() / STEREO_CHANNELS;
        out.clear();
        out.reserve(frames * SURROUND_CHANNELS);

        self.work.clear();
        self.work.extend_from_slice(&self.history);
        self.work
            .extend_from_slice(&stereo[..frames * STEREO_CHANNELS]);

        for i in 0..frames {
            let center = i + HALF_TAPS;
            let mut hl = 0.0f32;
            let mut hr = 0.0f32;
            for (k, &tap) in self.taps.iter().enumerate() {
                if tap == 0.0 {
                    continue;
                }
                let idx = (center + HALF_TAPS - k) * STEREO_CHANNELS;
                hl += tap * self.work[idx];
                hr += tap * self.work[idx + 1];
            }

            let l = self.work[center * STEREO_CHANNELS];
            let r = self.work[center * STEREO_CHANNELS + 1];
            let c = (l + r) * FRAC_1_SQRT_2;
            self.lfe_state += self.lfe_coeff * (c - self.lfe_state);

            out.extend_from_slice(&[
                l,
                r,
                c,
                self.lfe_state,
                REAR_MAJOR * hl - REAR_MINOR * hr,
                REAR_MINOR * hl - REAR_MAJOR * hr,
            ]);
        }

        let keep = self.history.len();
        let start = self.work.len() - keep;
        self.history.copy_from_slice(&self.work[start..]);
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.lfe_state = 0.0;
    }
}
