//! Speech-region detection: an external VAD model's facade contract plus a
//! real energy-based default implementation.

pub mod facade;
pub mod segmenter;
pub mod types;

pub use facade::{EnergyVad, VoiceActivityDetector};
pub use segmenter::SpeechSegmenter;
pub use types::SpeechRegion;
