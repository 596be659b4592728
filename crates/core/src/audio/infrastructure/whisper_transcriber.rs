use std::path::Path;
use std::sync::Mutex;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::domain::audio_clip::AudioClip;
use crate::audio::domain::transcription_service::TranscriptionService;
use crate::shared::constants::WHISPER_SAMPLE_RATE;
use crate::shared::error::ServiceError;
use crate::shared::language::LanguageCode;

/// whisper.cpp rejects inputs shorter than this.
const MIN_INPUT_SECS: f64 = 0.1;

/// Local speech-to-text using whisper.cpp via whisper-rs.
///
/// The model is loaded once; every call gets its own decoding state so
/// segments can be transcribed from several workers.
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    n_threads: i32,
}

impl WhisperTranscriber {
    /// `n_threads` is the per-call inference thread count; callers running
    /// several workers should divide the available cores between them.
    pub fn new(model_path: &Path, n_threads: usize) -> Result<Self, ServiceError> {
        if !model_path.exists() {
            return Err(format!("Whisper model not found at: {}", model_path.display()).into());
        }
        let context = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        Ok(Self {
            context: Mutex::new(context),
            n_threads: n_threads.max(1) as i32,
        })
    }
}

impl TranscriptionService for WhisperTranscriber {
    fn transcribe(&self, audio: &AudioClip, language: &LanguageCode) -> Result<String, ServiceError> {
        if audio.duration() < MIN_INPUT_SECS {
            return Ok(String::new());
        }
        if audio.sample_rate() != WHISPER_SAMPLE_RATE || audio.channels() != 1 {
            return Err(format!(
                "Whisper needs mono {WHISPER_SAMPLE_RATE} Hz audio, got {} Hz/{} ch",
                audio.sample_rate(),
                audio.channels()
            )
            .into());
        }

        let mut state = {
            let context = self
                .context
                .lock()
                .map_err(|e| format!("Whisper context poisoned: {e}"))?;
            context
                .create_state()
                .map_err(|e| format!("Failed to create Whisper state: {e}"))?
        };

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language.primary()));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_n_threads(self.n_threads);

        state
            .full(params, audio.samples())
            .map_err(|e| format!("Whisper inference failed: {e}"))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }
        Ok(text.trim().to_string())
    }
}
