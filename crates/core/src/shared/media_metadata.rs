/// Container-level facts about the input, read once when the source is opened.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaMetadata {
    pub duration_secs: f64,
    pub has_video: bool,
    /// Original audio sample rate and channel count, before decoding to mono.
    pub audio_format: Option<(u32, u16)>,
}

impl MediaMetadata {
    pub fn has_audio(&self) -> bool {
        self.audio_format.is_some()
    }
}
