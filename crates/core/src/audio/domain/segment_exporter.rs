use std::path::PathBuf;

use super::audio_clip::AudioClip;

/// Domain interface for saving synthesized segments individually.
pub trait SegmentExporter: Send {
    /// Store the speech synthesized for segment `index` and return where it went.
    fn export(&self, index: usize, audio: &AudioClip)
        -> Result<PathBuf, Box<dyn std::error::Error>>;
}
