//! subforge - Parallel Transcription Scheduler
//!
//! Turns one audio source into an SRT subtitle file: loads and resamples
//! the audio, segments it by voice activity, partitions speech into work
//! units, dispatches them across a worker pool (or a single in-process
//! engine), reassembles and merges the result, and cleans up its session
//! workspace unconditionally.

pub mod admission;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod partition;
pub mod postprocess;
pub mod scheduler;
pub mod session;
pub mod subtitle;
pub mod vad;
pub mod worker;

pub use config::{Args, Config};
pub use error::{Result, SubforgeError};

use admission::{EngineHandle, EngineKind, TranscriberPool};
use engine::{InferenceEngine, Language, ModelKey, Task, TextSegment};
use fetch::{MediaDownloader, NullDownloader};
use partition::WorkPartitioner;
use postprocess::{merge_adjacent, IdentityConverter, ScriptConverter};
use scheduler::Scheduler;
use session::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vad::{SpeechRegion, SpeechSegmenter};
use worker::WorkerPool;

/// Library version, exposed for `--verbose` banners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Sets `RUST_LOG` if unset and initialises `env_logger`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: called once at startup before any other threads read the
        // environment; never touched again afterwards.
        unsafe { std::env::set_var("RUST_LOG", level) };
    }
    env_logger::Builder::from_env("RUST_LOG").filter_level(log::LevelFilter::Info).try_init().ok();
}

#[derive(Debug, Clone)]
pub enum AudioSource {
    File(PathBuf),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    pub audio_source: AudioSource,
    pub model_name: String,
    pub precision: config::Precision,
    pub language: Language,
    pub task: Task,
    pub use_vad: bool,
    pub min_silence_s: f32,
    pub merge: bool,
    pub max_chars: usize,
    pub parallel: bool,
    pub convert_script: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    PartialFailure,
}

#[derive(Debug, Clone)]
pub struct TranscribeOutcome {
    pub status: Status,
    pub subtitles_text: String,
    pub subtitles_path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Builds `Box<dyn InferenceEngine>` for a given device, shared by both the
/// `WorkerPool` (one call per worker) and the admission cache's single-engine
/// path. The real model backend is an out-of-scope external collaborator;
/// the default factory below returns `StubEngine` regardless of
/// `model_name`.
pub type EngineFactory = dyn Fn(u32) -> Result<Box<dyn InferenceEngine>> + Send + Sync;

/// Bundles everything `transcribe` needs that outlives a single request:
/// the session allocator, the admission/engine-cache pool, device topology,
/// and the pluggable external collaborators (engine backend, script
/// converter, media downloader).
pub struct SubforgeContext {
    pub sessions: Arc<SessionManager>,
    pub admission: Arc<TranscriberPool>,
    pub device_list: Vec<u32>,
    pub engine_factory: Arc<EngineFactory>,
    pub script_converter: Arc<dyn ScriptConverter>,
    pub downloader: Arc<dyn MediaDownloader>,
    pub downloads_root: PathBuf,
    pub outputs_root: PathBuf,
    pub admission_deadline: Duration,
    pub min_unit_s: f64,
    pub max_unit_s: f64,
}

impl SubforgeContext {
    pub fn from_config(config: &Config) -> Result<Self> {
        let sessions = Arc::new(SessionManager::from_config(config)?);
        std::fs::create_dir_all(config.outputs_root())?;
        let ctx = Self {
            sessions,
            admission: Arc::new(TranscriberPool::new(config.max_sessions())),
            device_list: config.device_list().to_vec(),
            engine_factory: Arc::new(|_device_id| Ok(Box::new(engine::StubEngine::new()) as Box<dyn InferenceEngine>)),
            script_converter: Arc::new(IdentityConverter),
            downloader: Arc::new(NullDownloader),
            downloads_root: config.downloads_root(),
            outputs_root: config.outputs_root(),
            admission_deadline: Duration::from_millis(config.session.admission_deadline_ms),
            min_unit_s: config.partition.min_unit_s,
            max_unit_s: config.partition.max_unit_s,
        };

        if config.defaults.preload {
            ctx.preload_default_engine()?;
        }

        Ok(ctx)
    }

    /// Builds and warms one engine on the first configured device, then
    /// drops it. Its only purpose is to pay model-load latency here instead
    /// of on the first real request.
    fn preload_default_engine(&self) -> Result<()> {
        let first_device = self.device_list.first().copied().unwrap_or(0);
        log::info!("preloading default engine on device {first_device}");
        let mut engine = (self.engine_factory)(first_device)?;
        engine.warm_up()
    }
}

/// Runs one request end to end. The session workspace is guaranteed gone
/// (`Session::drop`) by the time this returns, success or failure.
pub fn transcribe(request: TranscribeRequest, ctx: &SubforgeContext) -> Result<TranscribeOutcome> {
    let mut warnings = Vec::new();

    let local_input = resolve_input(&request.audio_source, ctx)?;
    let session = ctx.sessions.open(Some(&local_input))?;
    let input_path = session
        .inputs
        .first()
        .ok_or_else(|| SubforgeError::input("no input was staged into the session"))?
        .clone();

    let audio = audio::load(&input_path)?;

    let regions = if request.use_vad {
        let mut segmenter = SpeechSegmenter::with_energy_vad(request.min_silence_s);
        segmenter.segment(&audio)?
    } else {
        vec![SpeechRegion::new(0.0, audio.duration_s())]
    };

    let worker_count = if request.parallel { ctx.device_list.len().max(1) } else { 1 };
    let units = WorkPartitioner::partition(&audio, &regions, worker_count, ctx.min_unit_s, ctx.max_unit_s)?;

    let model_key = ModelKey::new(request.model_name.clone(), request.precision);
    let deadline = Instant::now() + ctx.admission_deadline;
    let kind = if request.parallel { EngineKind::Parallel } else { EngineKind::Single };
    let factory = Arc::clone(&ctx.engine_factory);
    let first_device = ctx.device_list.first().copied().unwrap_or(0);
    let handle: EngineHandle = ctx.admission.acquire(kind, model_key.clone(), deadline, {
        let factory = Arc::clone(&factory);
        move || factory(first_device)
    })?;

    let segments = if request.parallel {
        let factory_for_pool = Arc::clone(&factory);
        let mut pool = WorkerPool::new(
            &ctx.device_list,
            model_key,
            session.workdir().to_path_buf(),
            Box::new(move |device_id| factory_for_pool(device_id)),
        )?;
        Scheduler::run(units, &mut pool, request.task)?
    } else {
        let mut engine = handle.engine.0.lock();
        Scheduler::run_single(units, &mut **engine, request.task, session.workdir())?
    };
    handle.release();

    let segments = if request.merge { merge_adjacent(segments, request.max_chars, &request.language) } else { segments };

    let segments = if request.convert_script && is_chinese_language(&request.language) {
        convert_segments(segments, ctx.script_converter.as_ref(), &mut warnings)
    } else {
        segments
    };

    let subtitles_text = subtitle::srt::render(&segments);

    let output_path = ctx.outputs_root.join(format!("{}.srt", session.session_id));
    std::fs::write(&output_path, &subtitles_text)?;

    let status = if warnings.is_empty() { Status::Ok } else { Status::PartialFailure };

    Ok(TranscribeOutcome { status, subtitles_text, subtitles_path: Some(output_path), warnings })
}

fn resolve_input(source: &AudioSource, ctx: &SubforgeContext) -> Result<PathBuf> {
    match source {
        AudioSource::File(path) => Ok(path.clone()),
        AudioSource::Url(url) => {
            std::fs::create_dir_all(&ctx.downloads_root)?;
            let (path, _title) = ctx.downloader.fetch(url, &ctx.downloads_root)?;
            Ok(path)
        }
    }
}

/// The script converter only makes sense for Chinese text; an explicit
/// `--convert-script` on a non-Chinese request is a no-op rather than an
/// error.
fn is_chinese_language(language: &Language) -> bool {
    matches!(language, Language::Code(code) if code.eq_ignore_ascii_case("zh") || code.to_ascii_lowercase().starts_with("zh-"))
}

fn convert_segments(segments: Vec<TextSegment>, converter: &dyn ScriptConverter, warnings: &mut Vec<String>) -> Vec<TextSegment> {
    segments
        .into_iter()
        .map(|segment| match converter.convert(&segment.text) {
            Ok(converted) => TextSegment { text: converted, ..segment },
            Err(e) => {
                warnings.push(format!("script conversion failed, keeping original text: {e}"));
                segment
            }
        })
        .collect()
}
