//! Wraps a `VoiceActivityDetector` with the fixed threshold/min-silence
//! parameters a session uses throughout its lifetime.

use crate::audio::AudioBuffer;
use crate::error::Result;
use crate::vad::facade::{EnergyVad, VoiceActivityDetector};
use crate::vad::types::{validate_ordered, SpeechRegion};

pub struct SpeechSegmenter {
    detector: Box<dyn VoiceActivityDetector>,
    threshold: f32,
    min_silence_ms: u32,
}

impl SpeechSegmenter {
    pub fn new(detector: Box<dyn VoiceActivityDetector>, threshold: f32, min_silence_ms: u32) -> Self {
        Self { detector, threshold, min_silence_ms }
    }

    pub fn with_energy_vad(min_silence_s: f32) -> Self {
        Self::new(Box::new(EnergyVad), 0.02, (min_silence_s * 1000.0) as u32)
    }

    pub fn segment(&mut self, audio: &AudioBuffer) -> Result<Vec<SpeechRegion>> {
        let regions = self.detector.detect(audio.samples(), self.threshold, self.min_silence_ms)?;
        validate_ordered(&regions)?;
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_a_synthetic_buffer() {
        let mut samples = vec![0.0_f32; 16_000 / 2];
        samples.extend(vec![0.5_f32; 16_000]);
        samples.extend(vec![0.0_f32; 16_000 / 2]);
        let audio = AudioBuffer::new(samples, 16_000).unwrap();

        let mut segmenter = SpeechSegmenter::with_energy_vad(0.2);
        let regions = segmenter.segment(&audio).unwrap();
        assert_eq!(regions.len(), 1);
    }
}
