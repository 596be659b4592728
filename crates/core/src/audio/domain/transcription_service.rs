use super::audio_clip::AudioClip;
use crate::shared::error::ServiceError;
use crate::shared::language::LanguageCode;

/// Domain interface for speech-to-text.
///
/// Silence or unintelligible audio is not an error: implementations return
/// an empty string.
pub trait TranscriptionService: Send + Sync {
    fn transcribe(&self, audio: &AudioClip, language: &LanguageCode) -> Result<String, ServiceError>;
}
