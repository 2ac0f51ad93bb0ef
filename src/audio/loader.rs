//! Load an audio file in whatever container it arrives in and normalise it
//! to the crate's fixed mono 16 kHz working format.

use crate::audio::buffer::AudioBuffer;
use crate::audio::resample;
use crate::audio::wav;
use crate::error::{Result, SubforgeError};
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Load `path`, mixing to mono and resampling to 16 kHz. WAV files go
/// through the `hound` fast path; everything else goes through symphonia's
/// generic container probe.
pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let is_wav = path.extension().map(|e| e.eq_ignore_ascii_case("wav")).unwrap_or(false);

    let (samples, sample_rate) = if is_wav {
        match wav::read_wav(path) {
            Ok(raw) => (raw.samples, raw.sample_rate),
            Err(_) => decode_with_symphonia(path)?,
        }
    } else {
        decode_with_symphonia(path)?
    };

    resample::resample_to_16k_mono(samples, sample_rate)
}

fn decode_with_symphonia(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = std::fs::File::open(path)
        .map_err(|e| SubforgeError::Decode { path: path.to_path_buf(), message: format!("cannot open: {e}") })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SubforgeError::Decode { path: path.to_path_buf(), message: format!("unrecognised container: {e}") })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| SubforgeError::Decode { path: path.to_path_buf(), message: "no default track".into() })?
        .clone();
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SubforgeError::Decode { path: path.to_path_buf(), message: format!("unsupported codec: {e}") })?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(16_000);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1).max(1);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => return Err(SubforgeError::Decode { path: path.to_path_buf(), message: e.to_string() }),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(SubforgeError::Decode { path: path.to_path_buf(), message: e.to_string() }),
        };

        let spec: SignalSpec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        if channels == 1 {
            samples.extend_from_slice(sample_buf.samples());
        } else {
            for frame in sample_buf.samples().chunks_exact(channels) {
                let sum: f32 = frame.iter().sum();
                samples.push(sum / channels as f32);
            }
        }
    }

    if samples.is_empty() {
        return Err(SubforgeError::EmptyAudio { path: path.to_path_buf() });
    }

    Ok((samples, sample_rate))
}
