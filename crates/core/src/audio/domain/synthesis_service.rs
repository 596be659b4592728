use super::audio_clip::AudioClip;
use crate::shared::error::ServiceError;
use crate::shared::language::LanguageCode;

/// Domain interface for text-to-speech.
///
/// Empty input text must yield an empty clip. All clips produced within one
/// run share the same sample rate and channel count so they can be joined.
pub trait SynthesisService: Send + Sync {
    fn synthesize(&self, text: &str, language: &LanguageCode) -> Result<AudioClip, ServiceError>;
}
