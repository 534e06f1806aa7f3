//! Pass-through stretch engine that records tempo and clear calls

use pcmflow_out::dsp::TimeStretch;
use std::sync::{Arc, Mutex};

/// Calls seen by a [`PassThroughStretch`]
#[derive(Debug, Clone, PartialEq)]
pub enum StretchCall {
    Clear,
    Tempo(f64),
    Put(usize),
}

pub type StretchLog = Arc<Mutex<Vec<StretchCall>>>;

pub struct PassThroughStretch {
    channels: usize,
    pending: Vec<f32>,
    log: StretchLog,
}

impl PassThroughStretch {
    pub fn new() -> (Self, StretchLog) {
        let log = StretchLog::default();
        (
            Self {
                channels: 2,
                pending: Vec::new(),
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl TimeStretch for PassThroughStretch {
    fn set_channels(&mut self, channels: usize) {
        self.channels = channels.max(1);
    }

    fn set_sample_rate(&mut self, _sample_rate: u32) {}

    fn set_tempo(&mut self, tempo: f64) {
        self.log.lock().unwrap().push(StretchCall::Tempo(tempo));
    }

    fn put_samples(&mut self, samples: &[f32]) {
        self.log
            .lock()
            .unwrap()
            .push(StretchCall::Put(samples.len() / self.channels));
        self.pending.extend_from_slice(samples);
    }

    fn receive_samples(&mut self, out: &mut [f32]) -> usize {
        let frames = (out.len() / self.channels).min(self.available_frames());
        let len = frames * self.channels;
        out[..len].copy_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        frames
    }

    fn available_frames(&self) -> usize {
        self.pending.len() / self.channels
    }

    fn clear(&mut self) {
        self.log.lock().unwrap().push(StretchCall::Clear);
        self.pending.clear();
    }
}
