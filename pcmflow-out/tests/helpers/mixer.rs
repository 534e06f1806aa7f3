//! Scripted upstream mixer
//!
//! Produces a deterministic ramp and keeps a copy of everything it produced,
//! so tests can compare device payloads against the exact input.

use pcmflow_out::stream::Mixer;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct ScriptedMixer {
    sample_rate: u32,
    /// Cap on frames per mix call (`None` = as requested)
    limit: Mutex<Option<usize>>,
    /// Speeds returned by successive reads; the last one repeats
    speeds: Mutex<VecDeque<f64>>,
    produced: Mutex<Vec<i16>>,
    next_value: Mutex<i16>,
    pub mix_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl ScriptedMixer {
    pub fn new() -> Self {
        Self {
            sample_rate: 48000,
            limit: Mutex::new(None),
            speeds: Mutex::new(VecDeque::from([1.0])),
            produced: Mutex::new(Vec::new()),
            next_value: Mutex::new(-20000),
            mix_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_limit(&self, frames: Option<usize>) {
        *self.limit.lock().unwrap() = frames;
    }

    /// Script the speed reads; the final value repeats
    pub fn set_speeds(&self, speeds: &[f64]) {
        *self.speeds.lock().unwrap() = speeds.iter().copied().collect();
    }

    pub fn produced(&self) -> Vec<i16> {
        self.produced.lock().unwrap().clone()
    }
}

impl Mixer for ScriptedMixer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn mix(&self, out: &mut [i16], frames: usize) -> usize {
        self.mix_calls.fetch_add(1, Ordering::SeqCst);
        let frames = match *self.limit.lock().unwrap() {
            Some(limit) => frames.min(limit),
            None => frames,
        };

        let mut value = self.next_value.lock().unwrap();
        let mut produced = self.produced.lock().unwrap();
        for sample in out[..frames * 2].iter_mut() {
            *sample = *value;
            *value = value.wrapping_add(7);
            produced.push(*sample);
        }
        frames
    }

    fn current_speed(&self) -> f64 {
        let mut speeds = self.speeds.lock().unwrap();
        if speeds.len() > 1 {
            speeds.pop_front().unwrap_or(1.0)
        } else {
            speeds.front().copied().unwrap_or(1.0)
        }
    }

    fn request_speed_refresh(&self) {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
    }
}
