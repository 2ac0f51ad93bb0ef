//! Error Type Definition Module
//!
//! Defines the error taxonomy for the transcription scheduler. Most
//! variants are per-unit or per-component data, not things that abort a
//! session: only `Input`, `Decode`, `EmptyAudio`, `Segmenter`, `Config`,
//! and `Processing` ever abort a session outright (see
//! `SubforgeError::is_session_fatal`) — everything else (a failed unit, a
//! dead worker, a cleanup hiccup) is recorded and the session continues.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SubforgeError {
    /// Unreadable source, unsupported container, or otherwise bad request.
    #[error("input error: {message}")]
    Input { message: String },

    /// The container/codec could not be opened.
    #[error("could not decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Decoded length was zero.
    #[error("decoded audio is empty: {path}")]
    EmptyAudio { path: PathBuf },

    /// The speech detector failed to initialise (not: zero regions found).
    #[error("speech segmenter could not initialise: {message}")]
    Segmenter { message: String },

    /// Caller did not get an admission slot within its deadline.
    #[error("admission timed out after {waited_ms}ms")]
    AdmissionTimeout { waited_ms: u64 },

    /// A worker could not initialise its device or model.
    #[error("worker {worker_id} failed to spawn: {message}")]
    WorkerSpawn { worker_id: usize, message: String },

    /// One unit failed (recorded as data by the scheduler, not propagated).
    #[error("unit {unit_id} failed to transcribe: {message}")]
    UnitTranscription { unit_id: usize, message: String },

    /// Out-of-memory on a worker.
    #[error("device exhausted on worker {worker_id}: {message}")]
    DeviceExhaustion { worker_id: usize, message: String },

    /// Non-fatal: logged and absorbed, never prevents a successful return.
    #[error("session cleanup failed: {message}")]
    Cleanup { message: String },

    /// Remote media fetch failed.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Bad configuration (CLI args, TOML file, or validated ranges).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// File I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected scheduler-level failure.
    #[error("processing error: {message}")]
    Processing { message: String },
}

pub type Result<T> = std::result::Result<T, SubforgeError>;

impl SubforgeError {
    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::Input { message: message.into() }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn processing<S: Into<String>>(message: S) -> Self {
        Self::Processing { message: message.into() }
    }

    pub fn segmenter<S: Into<String>>(message: S) -> Self {
        Self::Segmenter { message: message.into() }
    }

    pub fn cleanup<S: Into<String>>(message: S) -> Self {
        Self::Cleanup { message: message.into() }
    }

    /// True for errors that abort the owning session outright.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            SubforgeError::Input { .. }
                | SubforgeError::Decode { .. }
                | SubforgeError::EmptyAudio { .. }
                | SubforgeError::Segmenter { .. }
                | SubforgeError::Config { .. }
                | SubforgeError::Processing { .. }
                // Reaches the caller only once the scheduler's retry policy
                // has given up (two consecutive device exhaustions, or a
                // second worker respawn); any recoverable occurrence is
                // handled internally and never surfaces as this type.
                | SubforgeError::DeviceExhaustion { .. }
                | SubforgeError::WorkerSpawn { .. }
        )
    }
}

impl From<toml::de::Error> for SubforgeError {
    fn from(err: toml::de::Error) -> Self {
        SubforgeError::config(format!("failed to parse config file: {err}"))
    }
}

impl From<toml::ser::Error> for SubforgeError {
    fn from(err: toml::ser::Error) -> Self {
        SubforgeError::config(format!("failed to serialize config: {err}"))
    }
}

impl From<hound::Error> for SubforgeError {
    fn from(err: hound::Error) -> Self {
        SubforgeError::Decode { path: PathBuf::new(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_fatal_classification() {
        assert!(SubforgeError::input("bad").is_session_fatal());
        assert!(!SubforgeError::UnitTranscription { unit_id: 0, message: "x".into() }.is_session_fatal());
        assert!(!SubforgeError::Cleanup { message: "x".into() }.is_session_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = SubforgeError::WorkerSpawn { worker_id: 2, message: "oom".into() };
        let msg = format!("{err}");
        assert!(msg.contains('2'));
        assert!(msg.contains("oom"));
    }
}
