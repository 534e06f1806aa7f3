//! Sine tone mixer
//!
//! A lock-free [`Mixer`] producing a continuous stereo sine. The speed it
//! reports is set independently, so the tempo path can be exercised without
//! an upstream producer.

use crate::stream::source::Mixer;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tone amplitude relative to full scale
const AMPLITUDE: f64 = 0.25;

pub struct ToneMixer {
    sample_rate: u32,
    frequency: f64,
    speed_bits: AtomicU64,
    position: AtomicU64,
}

impl ToneMixer {
    pub fn new(sample_rate: u32, frequency: f64) -> Self {
        Self {
            sample_rate,
            frequency,
            speed_bits: AtomicU64::new(1.0f64.to_bits()),
            position: AtomicU64::new(0),
        }
    }

    /// Speed multiplier reported to the stream
    pub fn set_speed(&self, speed: f64) {
        self.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
    }

    /// Frames produced so far
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }
}

impl Mixer for ToneMixer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn mix(&self, out: &mut [i16], frames: usize) -> usize {
        let frames = frames.min(out.len() / 2);
        let start = self.position.fetch_add(frames as u64, Ordering::Relaxed);
        let step = TAU * self.frequency / self.sample_rate.max(1) as f64;

        for (i, frame) in out[..frames * 2].chunks_exact_mut(2).enumerate() {
            let phase = ((start + i as u64) as f64 * step) % TAU;
            let value = (phase.sin() * AMPLITUDE * i16::MAX as f64) as i16;
            frame[0] = value;
            frame[1] = value;
        }
        frames
    }

    fn current_speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }
}
