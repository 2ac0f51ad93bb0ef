//! Voice-activity-detection contract. The real detector (a neural VAD model)
//! is an out-of-scope external collaborator; `EnergyVad` is a genuine,
//! testable short-time-energy detector standing in for it.

use crate::error::Result;
use crate::vad::types::SpeechRegion;

pub trait VoiceActivityDetector: Send {
    /// Detect speech regions in 16 kHz mono `samples`. `threshold` is the
    /// detector's own unit (energy for `EnergyVad`); `min_silence_ms` sets
    /// the hangover before a speech run is considered ended.
    fn detect(&mut self, samples: &[f32], threshold: f32, min_silence_ms: u32) -> Result<Vec<SpeechRegion>>;
}

const FRAME_SAMPLES: usize = 320; // 20ms at 16kHz

/// Short-time-energy VAD with hangover smoothing, modelled on the
/// threshold-crossing / speech-start-end bookkeeping of a typical streaming
/// VAD iterator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyVad;

impl VoiceActivityDetector for EnergyVad {
    fn detect(&mut self, samples: &[f32], threshold: f32, min_silence_ms: u32) -> Result<Vec<SpeechRegion>> {
        let sample_rate = 16_000.0_f64;
        let frame_s = FRAME_SAMPLES as f64 / sample_rate;
        let min_silence_s = min_silence_ms as f64 / 1000.0;

        let mut regions = Vec::new();
        let mut speech_start: Option<f64> = None;
        let mut speech_end: Option<f64> = None;

        for (i, frame) in samples.chunks(FRAME_SAMPLES).enumerate() {
            let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
            let frame_start = i as f64 * frame_s;
            let frame_end = frame_start + frame.len() as f64 / sample_rate;

            if rms >= threshold {
                if speech_start.is_none() {
                    speech_start = Some(frame_start);
                }
                speech_end = Some(frame_end);
            } else if let (Some(start), Some(end)) = (speech_start, speech_end) {
                if frame_start - end >= min_silence_s {
                    regions.push(SpeechRegion::new(start, end));
                    speech_start = None;
                    speech_end = None;
                }
            }
        }

        if let (Some(start), Some(end)) = (speech_start, speech_end) {
            regions.push(SpeechRegion::new(start, end));
        }

        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(duration_s: f64, amplitude: f32) -> Vec<f32> {
        let n = (duration_s * 16_000.0) as usize;
        vec![amplitude; n]
    }

    #[test]
    fn detects_a_single_loud_run() {
        let mut samples = tone(0.2, 0.0);
        samples.extend(tone(1.0, 0.5));
        samples.extend(tone(0.2, 0.0));

        let mut vad = EnergyVad;
        let regions = vad.detect(&samples, 0.1, 100).unwrap();
        assert_eq!(regions.len(), 1);
        assert!(regions[0].duration_s() > 0.9);
    }

    #[test]
    fn silent_audio_yields_no_regions() {
        let samples = tone(1.0, 0.0);
        let mut vad = EnergyVad;
        let regions = vad.detect(&samples, 0.1, 100).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn short_gap_below_min_silence_does_not_split() {
        let mut samples = tone(0.5, 0.5);
        samples.extend(tone(0.05, 0.0));
        samples.extend(tone(0.5, 0.5));

        let mut vad = EnergyVad;
        let regions = vad.detect(&samples, 0.1, 200).unwrap();
        assert_eq!(regions.len(), 1);
    }
}
