//! WSOLA tempo stretcher
//!
//! Changes playback tempo without changing pitch by cutting the input into
//! overlapping windows and splicing them back together at the offset where
//! the waveforms line up best.
//!
//! ## Algorithm Overview
//!
//! 1. **Seek**: search `seek` frames of input for the offset whose first
//!    `overlap` frames correlate best with the tail kept from the last window
//! 2. **Crossfade**: blend the kept tail into the input at that offset
//! 3. **Copy**: emit the body of the window, keep its last `overlap` frames
//! 4. **Skip**: advance the input by `tempo * (window - overlap)` frames,
//!    carrying the fractional part to the next window
//!
//! Each window emits `window - overlap` frames, so output length scales by
//! `1 / tempo`.

/// Fastest tempo the stretcher follows; faster requests are clamped
pub const MAX_TEMPO: f64 = 100.0;

/// Tempo stretcher fed with interleaved float frames
pub trait TimeStretch: Send {
    fn set_channels(&mut self, channels: usize);

    fn set_sample_rate(&mut self, sample_rate: u32);

    /// Playback speed factor (1.0 = unchanged, 2.0 = twice as fast)
    fn set_tempo(&mut self, tempo: f64);

    /// Append interleaved input samples
    fn put_samples(&mut self, samples: &[f32]);

    /// Move processed frames into `out`, returning the number of frames written
    fn receive_samples(&mut self, out: &mut [f32]) -> usize;

    /// Processed frames ready to receive
    fn available_frames(&self) -> usize;

    /// Drop all buffered input, output and overlap history
    fn clear(&mut self);
}

/// Window timing in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WsolaConfig {
    /// Nominal window length; raised to twice the overlap when shorter
    pub sequence_ms: f64,
    /// Range searched for the best splice offset
    pub seek_window_ms: f64,
    /// Crossfade length between windows
    pub overlap_ms: f64,
}

impl Default for WsolaConfig {
    fn default() -> Self {
        Self {
            sequence_ms: 1.0,
            seek_window_ms: 28.0,
            overlap_ms: 12.0,
        }
    }
}

pub struct Wsola {
    config: WsolaConfig,
    channels: usize,
    sample_rate: u32,
    tempo: f64,

    // Derived lengths, in frames
    overlap_len: usize,
    seek_len: usize,
    window_len: usize,
    sample_req: usize,

    nominal_skip: f64,
    skip_fract: f64,

    input: Vec<f32>,
    output: Vec<f32>,
    mid: Vec<f32>,
    beginning: bool,
}

impl Wsola {
    pub fn new(config: WsolaConfig, channels: usize, sample_rate: u32) -> Self {
        let mut wsola = Self {
            config,
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
            tempo: 1.0,
            overlap_len: 0,
            seek_len: 0,
            window_len: 0,
            sample_req: 0,
            nominal_skip: 0.0,
            skip_fract: 0.0,
            input: Vec::new(),
            output: Vec::new(),
            mid: Vec::new(),
            beginning: true,
        };
        wsola.recalculate();
        wsola
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Frames buffered before the first window can be produced
    pub fn latency_frames(&self) -> usize {
        self.sample_req
    }

    fn frames_for(&self, ms: f64) -> usize {
        (ms * self.sample_rate as f64 / 1000.0).round() as usize
    }

    fn recalculate(&mut self) {
        self.overlap_len = self.frames_for(self.config.overlap_ms).max(1);
        self.seek_len = self.frames_for(self.config.seek_window_ms).max(1);
        self.window_len = self
            .frames_for(self.config.sequence_ms)
            .max(2 * self.overlap_len);
        self.update_skip();
    }

    fn update_skip(&mut self) {
        self.nominal_skip = self.tempo * (self.window_len - self.overlap_len) as f64;
        let skip = (self.nominal_skip + 0.5) as usize;
        self.sample_req = (skip + self.overlap_len).max(self.window_len) + self.seek_len;
    }

    fn input_frames(&self) -> usize {
        self.input.len() / self.channels
    }

    /// Offset within the seek range that best continues the kept tail
    fn best_offset(&self) -> usize {
        let ch = self.channels;
        let len = self.overlap_len * ch;
        let mut best = 0;
        let mut best_score = f64::MIN;

        for offset in 0..self.seek_len {
            let candidate = &self.input[offset * ch..offset * ch + len];
            let mut corr = 0.0f64;
            let mut norm = 0.0f64;
            for (&a, &b) in candidate.iter().zip(&self.mid) {
                corr += (a * b) as f64;
                norm += (a * a) as f64;
            }
            let score = if norm > 1e-12 { corr / norm.sqrt() } else { 0.0 };
            if score > best_score {
                best_score = score;
                best = offset;
            }
        }
        best
    }

    /// Emit the crossfade of the kept tail into the input at `offset`
    fn crossfade(&mut self, offset: usize) {
        let ch = self.channels;
        let start = offset * ch;
        let scale = 1.0 / self.overlap_len as f32;
        for i in 0..self.overlap_len {
            let fade_in = i as f32 * scale;
            let fade_out = 1.0 - fade_in;
            for c in 0..ch {
                let idx = i * ch + c;
                let sample = self.mid[idx] * fade_out + self.input[start + idx] * fade_in;
                self.output.push(sample);
            }
        }
    }

    fn process(&mut self) {
        let ch = self.channels;
        let body = self.window_len - 2 * self.overlap_len;

        while self.input_frames() >= self.sample_req {
            let mut offset = if self.beginning {
                self.beginning = false;
                self.output
                    .extend_from_slice(&self.input[..self.overlap_len * ch]);
                0
            } else {
                let offset = self.best_offset();
                self.crossfade(offset);
                offset
            };
            offset += self.overlap_len;

            self.output
                .extend_from_slice(&self.input[offset * ch..(offset + body) * ch]);

            let tail = offset + body;
            self.mid.clear();
            self.mid
                .extend_from_slice(&self.input[tail * ch..(tail + self.overlap_len) * ch]);

            self.skip_fract += self.nominal_skip;
            let skip = self.skip_fract as usize;
            self.skip_fract -= skip as f64;
            let consumed = (skip * ch).min(self.input.len());
            self.input.drain(..consumed);
        }
    }
}

impl TimeStretch for Wsola {
    fn set_channels(&mut self, channels: usize) {
        let channels = channels.max(1);
        if channels != self.channels {
            self.channels = channels;
            self.clear();
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.recalculate();
        // Kept overlap no longer matches the window lengths
        self.clear();
    }

    fn set_tempo(&mut self, tempo: f64) {
        if tempo > 0.0 && tempo.is_finite() {
            self.tempo = tempo.min(MAX_TEMPO);
            self.update_skip();
        }
    }

    fn put_samples(&mut self, samples: &[f32]) {
        let whole = samples.len() - samples.len() % self.channels;
        self.input.extend_from_slice(&samples[..whole]);
        self.process();
    }

    fn receive_samples(&mut self, out: &mut [f32]) -> usize {
        let frames = (out.len() / self.channels).min(self.available_frames());
        let len = frames * self.channels;
        out[..len].copy_from_slice(&self.output[..len]);
        self.output.drain(..len);
        frames
    }

    fn available_frames(&self) -> usize {
        self.output.len() / self.channels
    }

    fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
        self.mid.clear();
        self.skip_fract = 0.0;
        self.beginning = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const RATE: u32 = 48000;

    fn sine(frames: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let v = (2.0 * PI * 440.0 * i as f32 / RATE as f32).sin() * 0.5;
                [v, v]
            })
            .collect()
    }

    fn run(tempo: f64, frames: usize) -> usize {
        let mut wsola = Wsola::new(WsolaConfig::default(), 2, RATE);
        wsola.set_tempo(tempo);
        let input = sine(frames);
        let mut produced = 0;
        let mut out = vec![0.0f32; 512 * 2];
        for chunk in input.chunks(256 * 2) {
            wsola.put_samples(chunk);
            loop {
                let n = wsola.receive_samples(&mut out);
                if n == 0 {
                    break;
                }
                produced += n;
            }
        }
        produced
    }

    #[test]
    fn test_window_lengths() {
        let wsola = Wsola::new(WsolaConfig::default(), 2, RATE);
        assert_eq!(wsola.overlap_len, 576);
        assert_eq!(wsola.seek_len, 1344);
        // 1 ms sequence is raised to twice the overlap
        assert_eq!(wsola.window_len, 1152);
        assert_eq!(wsola.latency_frames(), 1152 + 1344);
    }

    #[test]
    fn test_unity_tempo_preserves_length() {
        let frames = RATE as usize;
        let produced = run(1.0, frames);
        let slack = 1152 + 1344 + 576;
        assert!(produced <= frames);
        assert!(produced + slack >= frames, "produced {}", produced);
    }

    #[test]
    fn test_double_tempo_halves_length() {
        let frames = RATE as usize * 2;
        let produced = run(2.0, frames);
        let expected = frames / 2;
        assert!(
            (produced as i64 - expected as i64).abs() < 3000,
            "produced {} expected ~{}",
            produced,
            expected
        );
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut wsola = Wsola::new(WsolaConfig::default(), 2, RATE);
        wsola.put_samples(&sine(8000));
        assert!(wsola.available_frames() > 0);
        wsola.clear();
        assert_eq!(wsola.available_frames(), 0);
        assert!(wsola.input.is_empty());
        assert!(wsola.beginning);
    }

    #[test]
    fn test_rejects_non_positive_tempo() {
        let mut wsola = Wsola::new(WsolaConfig::default(), 2, RATE);
        wsola.set_tempo(0.0);
        wsola.set_tempo(f64::NAN);
        assert_eq!(wsola.tempo(), 1.0);
    }

    #[test]
    fn test_huge_tempo_is_clamped() {
        let mut wsola = Wsola::new(WsolaConfig::default(), 2, RATE);
        wsola.set_tempo(1e17);
        assert_eq!(wsola.tempo(), MAX_TEMPO);
        assert_eq!(wsola.latency_frames(), 100 * 576 + 576 + 1344);

        wsola.put_samples(&[0.1; 512]);
        assert_eq!(wsola.available_frames(), 0);

        // Enough input for a few windows at the clamped skip
        wsola.put_samples(&sine(4 * wsola.latency_frames()));
        assert!(wsola.available_frames() > 0);
    }

    #[test]
    fn test_output_is_finite_and_bounded() {
        let mut wsola = Wsola::new(WsolaConfig::default(), 2, RATE);
        wsola.set_tempo(1.5);
        wsola.put_samples(&sine(20000));
        let mut out = vec![0.0f32; wsola.available_frames() * 2];
        let frames = wsola.receive_samples(&mut out);
        assert!(frames > 0);
        assert!(out.iter().all(|v| v.is_finite() && v.abs() <= 0.51));
    }
}
