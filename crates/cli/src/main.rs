use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use voiceover_core::audio::domain::transcription_service::TranscriptionService;
use voiceover_core::audio::infrastructure::ffmpeg_media_source::FfmpegMediaSource;
use voiceover_core::audio::infrastructure::google_tts_synthesizer::GoogleTtsSynthesizer;
use voiceover_core::audio::infrastructure::http_translator::HttpTranslator;
use voiceover_core::audio::infrastructure::wav_segment_exporter::WavSegmentExporter;
use voiceover_core::audio::infrastructure::whisper_transcriber::WhisperTranscriber;
use voiceover_core::pipeline::dub_video_use_case::DubVideoUseCase;
use voiceover_core::pipeline::infrastructure::worker_pool_executor::WorkerPoolExecutor;
use voiceover_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use voiceover_core::pipeline::run_context::RunContext;
use voiceover_core::pipeline::segment_pipeline::SegmentServices;
use voiceover_core::shared::constants::{
    CONTAINER_EXTENSIONS, DEFAULT_TRANSLATE_URL, GOOGLE_TTS_URL, SYNTHESIS_SAMPLE_RATE,
    WHISPER_MODEL_NAME, WHISPER_MODEL_URL,
};
use voiceover_core::shared::error::{DubError, ServiceError};
use voiceover_core::shared::language::LanguageCode;
use voiceover_core::shared::model_resolver::ModelResolver;
use voiceover_core::shared::run_config::RunConfig;
use voiceover_core::video::infrastructure::ffmpeg_audio_muxer::FfmpegAudioMuxer;

/// Translate the speech of a video and dub it with synthesized voice.
#[derive(Parser)]
#[command(name = "voiceover")]
struct Cli {
    /// Input video (or audio) file.
    input: PathBuf,

    /// Output file; the container is chosen from its extension.
    output: PathBuf,

    /// Length of each independently processed segment, in seconds [default: 30].
    #[arg(long)]
    segment_duration: Option<f64>,

    /// Language spoken in the input, e.g. en-US [default: en-US].
    #[arg(long)]
    source_lang: Option<LanguageCode>,

    /// Language of the dub, e.g. hi [default: hi].
    #[arg(long)]
    target_lang: Option<LanguageCode>,

    /// Segments processed at the same time [default: number of CPUs].
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seconds allowed for any single extract/transcribe/translate/synthesize call [default: 120].
    #[arg(long)]
    stage_timeout: Option<u64>,

    /// Extra rounds that re-run failed segments [default: 0].
    #[arg(long)]
    retries: Option<u32>,

    /// LibreTranslate-compatible translation endpoint.
    #[arg(long, default_value = DEFAULT_TRANSLATE_URL)]
    translate_url: String,

    /// API key for the translation endpoint.
    #[arg(long)]
    translate_api_key: Option<String>,

    /// Whisper ggml model file (downloaded on first use if omitted).
    #[arg(long)]
    whisper_model: Option<PathBuf>,

    /// JSON run configuration; flags given on the command line take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a per-segment JSON report here, even if the run fails.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Also save every synthesized segment as a WAV file in this directory.
    #[arg(long)]
    segments_dir: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    validate(&cli)?;

    let ctx = RunContext::new(&cli.input, config)?;
    let config = ctx.config();

    let media = Arc::new(FfmpegMediaSource::open(&cli.input)?);
    let services = SegmentServices {
        media,
        transcriber: build_transcriber(&cli, config.concurrency)?,
        translator: Arc::new(
            HttpTranslator::new(
                &cli.translate_url,
                cli.translate_api_key.clone(),
                config.stage_timeout(),
            )
            .map_err(boxed)?,
        ),
        synthesizer: Arc::new(
            GoogleTtsSynthesizer::new(
                GOOGLE_TTS_URL,
                ctx.scratch().clone(),
                SYNTHESIS_SAMPLE_RATE,
                config.stage_timeout(),
            )
            .map_err(boxed)?,
        ),
    };

    let mut use_case = DubVideoUseCase::new(
        services,
        Box::new(WorkerPoolExecutor::new()),
        Box::new(FfmpegAudioMuxer),
    )
    .with_logger(Box::new(StdoutPipelineLogger::new()));
    if let Some(dir) = &cli.segments_dir {
        use_case = use_case.with_exporter(Box::new(WavSegmentExporter::new(dir)?));
    }

    let processed = use_case.process(&ctx)?;
    if let Some(path) = &cli.report {
        processed.report().write(path)?;
        log::info!("Report written to {}", path.display());
    }

    match use_case.finish(&ctx, &processed, &cli.output) {
        Ok(()) => {
            log::info!("Output written to {}", cli.output.display());
            Ok(())
        }
        Err(e) => {
            if let DubError::IncompleteRun { failures, .. } = &e {
                eprintln!("No output written; failed segments:");
                for failure in failures {
                    eprintln!("  {failure}");
                }
            }
            Err(e.into())
        }
    }
}

/// Defaults, then the config file, then command-line flags.
fn build_config(cli: &Cli) -> Result<RunConfig, DubError> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(v) = cli.segment_duration {
        config.segment_duration_secs = v;
    }
    if let Some(v) = &cli.source_lang {
        config.source_language = v.clone();
    }
    if let Some(v) = &cli.target_lang {
        config.target_language = v.clone();
    }
    if let Some(v) = cli.concurrency {
        config.concurrency = v;
    }
    if let Some(v) = cli.stage_timeout {
        config.stage_timeout_secs = v;
    }
    if let Some(v) = cli.retries {
        config.max_retries = v;
    }
    config.validate()?;
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if same_file(&cli.input, &cli.output) {
        return Err("Output must not overwrite the input file".into());
    }
    if !has_container_extension(&cli.output) {
        return Err(format!(
            "Output extension must be one of: {}, got '{}'",
            CONTAINER_EXTENSIONS.join(", "),
            cli.output.display()
        )
        .into());
    }
    if let Some(model) = &cli.whisper_model {
        if !model.exists() {
            return Err(format!("Whisper model not found: {}", model.display()).into());
        }
    }
    Ok(())
}

fn build_transcriber(
    cli: &Cli,
    concurrency: usize,
) -> Result<Arc<dyn TranscriptionService>, Box<dyn std::error::Error>> {
    let model_path = match &cli.whisper_model {
        Some(path) => path.clone(),
        None => {
            log::info!("Resolving model: {WHISPER_MODEL_NAME}");
            let path = ModelResolver::new()?
                .on_progress(Box::new(download_progress))
                .resolve(WHISPER_MODEL_NAME, WHISPER_MODEL_URL)?;
            eprintln!();
            path
        }
    };
    let n_threads = (available_cpus() / concurrency.max(1)).max(1);
    let transcriber = WhisperTranscriber::new(&model_path, n_threads).map_err(boxed)?;
    Ok(Arc::new(transcriber))
}

fn boxed(e: ServiceError) -> Box<dyn std::error::Error> {
    e
}

fn has_container_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CONTAINER_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading speech recognition model... {pct}%");
    } else {
        eprint!("\rDownloading speech recognition model... {downloaded} bytes");
    }
}
