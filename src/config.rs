//! Configuration management for the transcription scheduler.

use crate::error::{Result, SubforgeError};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Numeric precision a model is loaded at. `int8` roughly halves device
/// memory versus `float32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Float16,
    Int8,
    Float32,
}

impl FromStr for Precision {
    type Err = SubforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "float16" | "fp16" => Ok(Precision::Float16),
            "int8" => Ok(Precision::Int8),
            "float32" | "fp32" => Ok(Precision::Float32),
            other => Err(SubforgeError::config(format!("unknown precision: {other}"))),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Float16 => write!(f, "float16"),
            Precision::Int8 => write!(f, "int8"),
            Precision::Float32 => write!(f, "float32"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub precision: Precision,
    pub device_list: Vec<u32>,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub root_dir: PathBuf,
    pub max_sessions: usize,
    pub sweep_max_age_secs: u64,
    pub admission_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub min_unit_s: f64,
    pub max_unit_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_host: String,
    pub listen_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefaults {
    pub language: String,
    pub translate: bool,
    pub use_vad: bool,
    pub min_silence_s: f32,
    pub merge: bool,
    pub max_chars: usize,
    pub parallel: bool,
    pub convert_script: bool,
    pub preload: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub session: SessionConfig,
    pub partition: PartitionConfig,
    pub server: ServerConfig,
    pub defaults: RequestDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            session: SessionConfig::default(),
            partition: PartitionConfig::default(),
            server: ServerConfig::default(),
            defaults: RequestDefaults::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "base".to_string(),
            precision: Precision::Float32,
            device_list: vec![0],
            max_retries: 1,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./subforge-data"),
            max_sessions: 2,
            sweep_max_age_secs: 24 * 3600,
            admission_deadline_ms: 30_000,
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self { min_unit_s: 15.0, max_unit_s: 45.0 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_host: "127.0.0.1".to_string(), listen_port: 8080 }
    }
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            translate: false,
            use_vad: true,
            min_silence_s: 0.3,
            merge: true,
            max_chars: 80,
            parallel: true,
            convert_script: false,
            preload: false,
            verbose: false,
        }
    }
}

impl Config {
    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn precision(&self) -> Precision {
        self.model.precision
    }

    pub fn device_list(&self) -> &[u32] {
        &self.model.device_list
    }

    pub fn worker_count(&self) -> usize {
        self.model.device_list.len().max(1)
    }

    pub fn max_sessions(&self) -> usize {
        self.session.max_sessions
    }

    pub fn sessions_root(&self) -> PathBuf {
        self.session.root_dir.join("sessions")
    }

    pub fn downloads_root(&self) -> PathBuf {
        self.session.root_dir.join("downloads")
    }

    pub fn outputs_root(&self) -> PathBuf {
        self.session.root_dir.join("outputs")
    }

    pub fn verbose(&self) -> bool {
        self.defaults.verbose
    }

    pub fn language(&self) -> &str {
        &self.defaults.language
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "subforge", about = "Parallel transcription scheduler", version, author)]
pub struct Args {
    #[arg(short = 'i', long = "input", help = "Input audio file path or remote media URL")]
    pub input: PathBuf,

    #[arg(short = 'o', long = "output", default_value = "output.srt", help = "Output subtitle file path")]
    pub output: PathBuf,

    #[arg(long = "model-name", default_value = "base", help = "Inference model variant")]
    pub model_name: String,

    #[arg(long = "precision", default_value = "float32", help = "Numeric precision: float16, int8, float32")]
    pub precision: String,

    #[arg(long = "device-list", default_value = "0", help = "Comma-separated device ordinals")]
    pub device_list: String,

    #[arg(long = "language", default_value = "auto", help = "BCP-47-like language code, or 'auto'")]
    pub language: String,

    #[arg(long = "translate", help = "Translate instead of transcribe")]
    pub translate: bool,

    #[arg(long = "use-vad", default_value = "true", action = clap::ArgAction::Set, help = "Enable voice-activity-based segmentation")]
    pub use_vad: bool,

    #[arg(long = "min-silence", default_value = "0.3", help = "Minimum silence gap in seconds (0.01 - 2.0)")]
    pub min_silence_s: f32,

    #[arg(long = "merge", default_value = "true", action = clap::ArgAction::Set, help = "Merge short adjacent subtitles")]
    pub merge: bool,

    #[arg(long = "max-chars", default_value = "80", help = "Max characters per merged subtitle line (40 - 120)")]
    pub max_chars: usize,

    #[arg(long = "parallel", default_value = "true", action = clap::ArgAction::Set, help = "Use the parallel worker pool instead of a single in-process engine")]
    pub parallel: bool,

    #[arg(long = "convert-script", help = "Convert simplified Chinese to traditional")]
    pub convert_script: bool,

    #[arg(long = "max-sessions", default_value = "2", help = "Admission ceiling for concurrent sessions")]
    pub max_sessions: usize,

    #[arg(long = "root-dir", default_value = "./subforge-data", help = "Root directory for sessions/downloads/outputs")]
    pub root_dir: PathBuf,

    #[arg(long = "preload", help = "Warm the default engine at process start")]
    pub preload: bool,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,

    #[arg(short = 'c', long = "config", help = "Config file path (TOML format)")]
    pub config_file: Option<PathBuf>,
}

impl Config {
    pub fn from_args() -> Result<Self> {
        let args = Args::parse();
        Self::from_args_and_config(args)
    }

    /// Create config from command line arguments and an optional config file.
    pub fn from_args_and_config(args: Args) -> Result<Self> {
        let mut config = if let Some(config_path) = &args.config_file {
            Self::from_file(config_path)?
        } else {
            Self::default()
        };

        config.model.name = args.model_name;
        config.model.precision = args.precision.parse()?;
        config.model.device_list = args
            .device_list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u32>().map_err(|e| SubforgeError::config(format!("bad device id '{s}': {e}"))))
            .collect::<Result<Vec<_>>>()?;
        config.session.max_sessions = args.max_sessions;
        config.session.root_dir = args.root_dir;
        config.defaults.language = args.language;
        config.defaults.translate = args.translate;
        config.defaults.use_vad = args.use_vad;
        config.defaults.min_silence_s = args.min_silence_s;
        config.defaults.merge = args.merge;
        config.defaults.max_chars = args.max_chars;
        config.defaults.parallel = args.parallel;
        config.defaults.convert_script = args.convert_script;
        config.defaults.preload = args.preload;
        config.defaults.verbose = args.verbose;

        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration parameter validity.
    pub fn validate(&self) -> Result<()> {
        if self.model.device_list.is_empty() {
            return Err(SubforgeError::config("device_list must not be empty"));
        }
        if self.session.max_sessions == 0 {
            return Err(SubforgeError::config("max_sessions must be greater than 0"));
        }
        if self.partition.min_unit_s <= 0.0 || self.partition.max_unit_s <= self.partition.min_unit_s {
            return Err(SubforgeError::config("partition bounds must satisfy 0 < min_unit_s < max_unit_s"));
        }
        if !(0.01..=2.0).contains(&(self.defaults.min_silence_s as f64)) {
            return Err(SubforgeError::config("min_silence_s must be in [0.01, 2.0]"));
        }
        if !(40..=120).contains(&self.defaults.max_chars) {
            return Err(SubforgeError::config("max_chars must be in [40, 120]"));
        }
        if self.model.max_retries > 10 {
            return Err(SubforgeError::config("max_retries cannot exceed 10"));
        }
        Ok(())
    }

    /// Save config to file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save_to_file(path)
    }
}

pub mod utils {
    pub fn cpu_count() -> usize {
        num_cpus::get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn precision_parses_case_insensitively() {
        assert_eq!("Int8".parse::<Precision>().unwrap(), Precision::Int8);
        assert_eq!("FLOAT16".parse::<Precision>().unwrap(), Precision::Float16);
        assert!("bogus".parse::<Precision>().is_err());
    }

    #[test]
    fn config_validation_rejects_bad_bounds() {
        let mut config = Config::default();
        config.model.device_list.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.partition.max_unit_s = config.partition.min_unit_s;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.defaults.max_chars = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = Config::default();
        config.save_to_file(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = Config::from_file(&config_path).unwrap();
        assert_eq!(loaded.model.name, config.model.name);
        assert_eq!(loaded.session.max_sessions, config.session.max_sessions);
    }

    #[test]
    fn persisted_layout_paths() {
        let config = Config::default();
        assert_eq!(config.sessions_root(), config.session.root_dir.join("sessions"));
        assert_eq!(config.downloads_root(), config.session.root_dir.join("downloads"));
        assert_eq!(config.outputs_root(), config.session.root_dir.join("outputs"));
    }
}
