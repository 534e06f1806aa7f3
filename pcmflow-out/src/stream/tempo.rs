//! Tempo synchronization
//!
//! Drives the stretch engine's tempo from the mixer's speed multiplier.
//!
//! | speed         | action                                      |
//! |---------------|---------------------------------------------|
//! | <= 0.10       | tempo untouched, samples bypass the engine  |
//! | 0.10 ..= 10.0 | set tempo, feed engine                      |
//! | > 10.0        | set tempo, clear engine history, feed engine|

use crate::audio::types::STEREO_CHANNELS;
use crate::dsp::TimeStretch;
use crate::stream::source::Mixer;
use tracing::{debug, trace};

/// Speeds at or below this are not applied
pub const MIN_TEMPO: f64 = 0.10;

/// Speeds above this flush the engine history
pub const FLUSH_TEMPO: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoDecision {
    PassThrough,
    Stretch(f64),
    StretchAndFlush(f64),
}

pub fn tempo_policy(speed: f64) -> TempoDecision {
    if !(speed > MIN_TEMPO) {
        TempoDecision::PassThrough
    } else if speed > FLUSH_TEMPO {
        TempoDecision::StretchAndFlush(speed)
    } else {
        TempoDecision::Stretch(speed)
    }
}

pub struct TempoSync {
    engine: Box<dyn TimeStretch>,
    bypass: Vec<f32>,
}

impl TempoSync {
    /// Configure `engine` for stereo at `sample_rate` and unity tempo
    pub fn new(mut engine: Box<dyn TimeStretch>, sample_rate: u32) -> Self {
        engine.set_channels(STEREO_CHANNELS);
        engine.set_sample_rate(sample_rate);
        engine.set_tempo(1.0);
        engine.clear();
        Self {
            engine,
            bypass: Vec::new(),
        }
    }

    /// Read the mixer speed, asking for a refresh and reading once more if unusable
    pub fn resolve_speed(mixer: &dyn Mixer) -> f64 {
        let speed = mixer.current_speed();
        if speed > 0.0 {
            return speed;
        }
        trace!("Speed read {}, requesting refresh", speed);
        mixer.request_speed_refresh();
        mixer.current_speed()
    }

    /// Feed interleaved stereo `samples` at playback `speed`
    pub fn ingest(&mut self, samples: &[f32], speed: f64) -> TempoDecision {
        let decision = tempo_policy(speed);
        match decision {
            TempoDecision::PassThrough => self.bypass.extend_from_slice(samples),
            TempoDecision::Stretch(tempo) => {
                self.engine.set_tempo(tempo);
                self.engine.put_samples(samples);
            }
            TempoDecision::StretchAndFlush(tempo) => {
                self.engine.set_tempo(tempo);
                self.engine.clear();
                debug!("Tempo {:.2} above {}, stretch history cleared", tempo, FLUSH_TEMPO);
                self.engine.put_samples(samples);
            }
        }
        decision
    }

    /// Move up to `out.len() / 2` frames into `out`, engine output first
    pub fn drain(&mut self, out: &mut [f32]) -> usize {
        let stretched = self.engine.receive_samples(out);
        let offset = stretched * STEREO_CHANNELS;

        let room = (out.len() - offset) / STEREO_CHANNELS;
        let passed = room.min(self.bypass.len() / STEREO_CHANNELS);
        let len = passed * STEREO_CHANNELS;
        out[offset..offset + len].copy_from_slice(&self.bypass[..len]);
        self.bypass.drain(..len);

        stretched + passed
    }

    /// Drop all pending samples and stretch history
    pub fn flush(&mut self) {
        self.engine.clear();
        self.bypass.clear();
    }
}
