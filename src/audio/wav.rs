//! WAV fast path: read/write via `hound`, mixed down to mono on load.

use crate::error::{Result, SubforgeError};
use hound::{SampleFormat, WavReader, WavWriter};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Int16,
    Float32,
}

/// Mono samples plus their native sample rate, straight off disk. Not yet
/// resampled to 16 kHz — callers run this through `audio::resample`.
pub struct RawWav {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Read a WAV file, mixing stereo down to mono by channel average.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<RawWav> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SubforgeError::Decode {
        path: path.to_path_buf(),
        message: format!("cannot open: {e}"),
    })?;

    let mut reader = WavReader::new(file).map_err(|e| SubforgeError::Decode {
        path: path.to_path_buf(),
        message: format!("WAV read error: {e}"),
    })?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(SubforgeError::Decode { path: path.to_path_buf(), message: "zero sample rate".into() });
    }
    if spec.channels == 0 || spec.channels > 2 {
        return Err(SubforgeError::Decode {
            path: path.to_path_buf(),
            message: format!("unsupported channel count: {}", spec.channels),
        });
    }

    let raw: Vec<f32> = match (spec.bits_per_sample, spec.sample_format) {
        (16, SampleFormat::Int) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SubforgeError::Decode { path: path.to_path_buf(), message: e.to_string() })?,
        (32, SampleFormat::Float) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SubforgeError::Decode { path: path.to_path_buf(), message: e.to_string() })?,
        (bits, _) => {
            return Err(SubforgeError::Decode {
                path: path.to_path_buf(),
                message: format!("unsupported sample format: {bits} bit"),
            });
        }
    };

    if raw.is_empty() {
        return Err(SubforgeError::EmptyAudio { path: path.to_path_buf() });
    }

    let mono = if spec.channels == 1 {
        raw
    } else {
        raw.chunks_exact(2).map(|c| (c[0] + c[1]) / 2.0).collect()
    };

    Ok(RawWav { samples: mono, sample_rate: spec.sample_rate })
}

/// Write mono f32 samples as a 16-bit PCM WAV.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = File::create(path)
        .map_err(|e| SubforgeError::Decode { path: path.to_path_buf(), message: format!("cannot create: {e}") })?;
    let mut writer = WavWriter::new(file, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn roundtrip_mono() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 / 1600.0).sin()).collect();
        let temp = NamedTempFile::new().unwrap();
        write_wav(temp.path(), &samples, 16_000).unwrap();

        let loaded = read_wav(temp.path()).unwrap();
        assert_eq!(loaded.sample_rate, 16_000);
        assert_eq!(loaded.samples.len(), samples.len());
    }

    #[test]
    fn empty_file_is_rejected() {
        let temp = NamedTempFile::new().unwrap();
        write_wav(temp.path(), &[], 16_000).unwrap();
        assert!(read_wav(temp.path()).is_err());
    }

    #[test]
    fn stereo_mixes_down_to_mono() {
        let spec = hound::WavSpec { channels: 2, sample_rate: 16_000, bits_per_sample: 16, sample_format: SampleFormat::Int };
        let temp = NamedTempFile::new().unwrap();
        {
            let mut writer = WavWriter::create(temp.path(), spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(10_000i16).unwrap();
                writer.write_sample(-10_000i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let loaded = read_wav(temp.path()).unwrap();
        assert_eq!(loaded.samples.len(), 100);
        assert!(loaded.samples.iter().all(|&s| s.abs() < 1e-6));
    }
}
