use std::path::Path;

use crate::audio::domain::audio_clip::AudioClip;
use crate::audio::domain::media_source::MediaSource;
use crate::shared::constants::WHISPER_SAMPLE_RATE;
use crate::shared::error::{DubError, ServiceError};

use super::ffmpeg_decoder::{decode_audio, probe};

const RANGE_TOLERANCE_SECS: f64 = 1e-6;

/// Media source backed by a file on disk.
///
/// The audio track is decoded once, at open time, to mono f32 at the rate the
/// recognizer expects. Extraction is then a copy out of that buffer, so any
/// number of workers can extract concurrently.
#[derive(Debug)]
pub struct FfmpegMediaSource {
    audio: AudioClip,
    duration: f64,
}

impl FfmpegMediaSource {
    pub fn open(path: &Path) -> Result<Self, DubError> {
        let media_err = |e: ServiceError| DubError::Media(format!("{}: {e}", path.display()));

        let metadata = probe(path).map_err(media_err)?;
        if !metadata.has_audio() {
            return Err(DubError::InvalidInput(format!(
                "{} has no audio stream",
                path.display()
            )));
        }
        let audio = decode_audio(path, WHISPER_SAMPLE_RATE)
            .map_err(media_err)?
            .ok_or_else(|| {
                DubError::InvalidInput(format!("{} has no audio stream", path.display()))
            })?;

        let duration = if metadata.duration_secs > 0.0 {
            metadata.duration_secs
        } else {
            audio.duration()
        };
        log::info!(
            "Opened {}: {:.2}s, video: {}, audio: {:?}",
            path.display(),
            duration,
            metadata.has_video,
            metadata.audio_format
        );

        Ok(Self { audio, duration })
    }
}

impl MediaSource for FfmpegMediaSource {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn extract_audio_range(&self, start: f64, end: f64) -> Result<AudioClip, ServiceError> {
        check_range(start, end, self.duration)?;
        Ok(self.audio.slice(start, end))
    }
}

fn check_range(start: f64, end: f64, duration: f64) -> Result<(), ServiceError> {
    if !(start.is_finite() && end.is_finite())
        || start < 0.0
        || end < start
        || end > duration + RANGE_TOLERANCE_SECS
    {
        return Err(format!(
            "range [{start}s, {end}s) is outside the input [0s, {duration}s]"
        )
        .into());
    }
    Ok(())
}
