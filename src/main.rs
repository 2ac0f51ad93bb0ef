//! subforge - Parallel Transcription Scheduler CLI

use clap::Parser;
use std::process;
use subforge::{init_logging, AudioSource, Args, Config, Result};

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let input = args.input.clone();
    let output = args.output.clone();
    let verbose = args.verbose;

    let config = Config::from_args_and_config(args)?;

    if verbose {
        println!("subforge v{}", subforge::VERSION);
        println!("model: {} ({})", config.model_name(), config.precision());
        println!("devices: {:?}", config.device_list());
        println!();
    }

    let ctx = subforge::SubforgeContext::from_config(&config)?;

    let audio_source = parse_audio_source(&input);
    let request = subforge::TranscribeRequest {
        audio_source,
        model_name: config.model_name().to_string(),
        precision: config.precision(),
        language: parse_language(config.language()),
        task: if config.defaults.translate { subforge::engine::Task::Translate } else { subforge::engine::Task::Transcribe },
        use_vad: config.defaults.use_vad,
        min_silence_s: config.defaults.min_silence_s,
        merge: config.defaults.merge,
        max_chars: config.defaults.max_chars,
        parallel: config.defaults.parallel,
        convert_script: config.defaults.convert_script,
    };

    println!("=== subforge ===");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());

    let outcome = subforge::transcribe(request, &ctx)?;

    std::fs::write(&output, &outcome.subtitles_text)?;

    println!("=== Done ===");
    println!("Status: {:?}", outcome.status);
    if let Some(path) = &outcome.subtitles_path {
        println!("Session artefact: {}", path.display());
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    Ok(())
}

fn parse_audio_source(input: &std::path::Path) -> AudioSource {
    let as_str = input.to_string_lossy();
    if as_str.starts_with("http://") || as_str.starts_with("https://") {
        AudioSource::Url(as_str.into_owned())
    } else {
        AudioSource::File(input.to_path_buf())
    }
}

fn parse_language(raw: &str) -> subforge::engine::Language {
    if raw.eq_ignore_ascii_case("auto") || raw.is_empty() {
        subforge::engine::Language::Auto
    } else {
        subforge::engine::Language::Code(raw.to_string())
    }
}
