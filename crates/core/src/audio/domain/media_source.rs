use super::audio_clip::AudioClip;
use crate::shared::error::ServiceError;

/// Domain interface for the input media.
///
/// Shared by every worker, so extraction must not depend on mutable state.
pub trait MediaSource: Send + Sync {
    /// Total duration of the input in seconds.
    fn duration(&self) -> f64;

    /// Return the audio in `[start, end)` seconds as a standalone clip.
    fn extract_audio_range(&self, start: f64, end: f64) -> Result<AudioClip, ServiceError>;
}
