pub const DEFAULT_SEGMENT_DURATION_SECS: f64 = 30.0;

/// Upper bound on the number of segments a single run may be split into.
pub const MAX_SEGMENTS: usize = 1_000_000;

/// Per-call ceiling for every external stage (extract, transcribe, translate, synthesize).
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_SOURCE_LANGUAGE: &str = "en-US";
pub const DEFAULT_TARGET_LANGUAGE: &str = "hi";

pub const WHISPER_MODEL_NAME: &str = "ggml-base.bin";
pub const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin";
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

pub const DEFAULT_TRANSLATE_URL: &str = "http://localhost:5000/translate";
pub const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Rate of the synthesized speech and therefore of the dubbed audio track.
pub const SYNTHESIS_SAMPLE_RATE: u32 = 16000;

/// Longest text the TTS endpoint accepts in a single request.
pub const TTS_MAX_CHUNK_CHARS: usize = 100;

/// Output containers that accept a copied video stream plus AAC audio.
pub const CONTAINER_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "m4v", "m4a"];
