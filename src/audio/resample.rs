//! Resample mono audio to the crate's fixed 16 kHz working rate.

use crate::audio::buffer::{AudioBuffer, TARGET_SAMPLE_RATE};
use crate::error::{Result, SubforgeError};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

const CHUNK_SIZE: usize = 1024;

/// Resample `samples` (mono, `from_rate`) to 16 kHz mono, returning an
/// `AudioBuffer`. A no-op copy when `from_rate` already matches.
pub fn resample_to_16k_mono(samples: Vec<f32>, from_rate: u32) -> Result<AudioBuffer> {
    if from_rate == TARGET_SAMPLE_RATE {
        return AudioBuffer::new(samples, TARGET_SAMPLE_RATE);
    }
    if samples.is_empty() {
        return Err(SubforgeError::EmptyAudio { path: std::path::PathBuf::new() });
    }

    let ratio = TARGET_SAMPLE_RATE as f64 / from_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(ratio, 2.0, PolynomialDegree::Cubic, CHUNK_SIZE, 1)
        .map_err(|e| SubforgeError::processing(format!("resampler init failed: {e}")))?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let mut out: Vec<f32> = Vec::with_capacity(expected_len + CHUNK_SIZE);
    let mut offset = 0;

    while offset < samples.len() {
        let end = (offset + CHUNK_SIZE).min(samples.len());
        let mut chunk = samples[offset..end].to_vec();
        if chunk.len() < CHUNK_SIZE {
            chunk.resize(CHUNK_SIZE, 0.0);
        }

        let produced = resampler
            .process(&[chunk], None)
            .map_err(|e| SubforgeError::processing(format!("resample failed: {e}")))?;
        out.extend_from_slice(&produced[0]);

        offset = end;
    }

    out.truncate(expected_len.max(1));
    AudioBuffer::new(out, TARGET_SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rate_is_no_op() {
        let samples = vec![0.1_f32, 0.2, 0.3, 0.4];
        let buf = resample_to_16k_mono(samples.clone(), 16_000).unwrap();
        assert_eq!(buf.samples(), samples.as_slice());
    }

    #[test]
    fn downsamples_to_expected_length() {
        let samples: Vec<f32> = (0..48_000).map(|i| (i as f32 / 48_000.0 * std::f32::consts::TAU).sin()).collect();
        let buf = resample_to_16k_mono(samples, 48_000).unwrap();
        // 3:1 downsample, allow rounding slack from chunked processing.
        assert!((buf.len() as i64 - 16_000).abs() < 50);
        assert_eq!(buf.sample_rate(), 16_000);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(resample_to_16k_mono(Vec::new(), 44_100).is_err());
    }
}
