//! Surround stage: stereo to 5.1 through the configured decoder

use crate::audio::types::{LFE_CHANNEL, STEREO_CHANNELS, SURROUND_CHANNELS};
use crate::dsp::SurroundDecoder;

pub struct SurroundStage {
    decoder: Box<dyn SurroundDecoder>,
    output: Vec<f32>,
}

impl SurroundStage {
    pub fn new(mut decoder: Box<dyn SurroundDecoder>) -> Self {
        decoder.reset();
        Self {
            decoder,
            output: Vec::new(),
        }
    }

    /// Frames a cycle must exceed before it is decoded
    pub fn min_window(&self) -> usize {
        self.decoder.min_window()
    }

    /// Decode interleaved stereo into 5.1 with a silent LFE channel
    pub fn decode(&mut self, stereo: &[f32]) -> &[f32] {
        self.decoder.decode(stereo, &mut self.output);

        let frames = stereo.len() / STEREO_CHANNELS;
        self.output.truncate(frames * SURROUND_CHANNELS);
        for frame in self.output.chunks_exact_mut(SURROUND_CHANNELS) {
            frame[LFE_CHANNEL] = 0.0;
        }
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Dpl2Decoder;

    #[test]
    fn test_lfe_is_zeroed() {
        let mut stage = SurroundStage::new(Box::new(Dpl2Decoder::new(48000)));
        let stereo = vec![0.9f32; 2 * 500];
        let out = stage.decode(&stereo);
        assert_eq!(out.len(), 500 * SURROUND_CHANNELS);
        assert!(out
            .chunks_exact(SURROUND_CHANNELS)
            .all(|frame| frame[LFE_CHANNEL] == 0.0));
        // Centre carries the signal once the filter has filled
        assert!(out[(499 * SURROUND_CHANNELS) + 2] > 0.5);
    }
}
