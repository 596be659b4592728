use std::path::Path;

use crate::audio::domain::audio_clip::AudioClip;

/// Domain interface for writing the dubbed output container.
pub trait AudioMuxer: Send {
    /// Write `output_path` with the video stream of `source_path` and `audio`
    /// as its only audio track. The source file is left untouched.
    fn mux(
        &self,
        source_path: &Path,
        audio: &AudioClip,
        output_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
