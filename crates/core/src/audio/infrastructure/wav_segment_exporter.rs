use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::domain::audio_clip::AudioClip;
use crate::audio::domain::segment_exporter::SegmentExporter;

/// Writes each synthesized segment as 16-bit PCM `segment_<index>.wav`.
pub struct WavSegmentExporter {
    dir: PathBuf,
}

impl WavSegmentExporter {
    /// Creates `dir` if it does not exist.
    pub fn new(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("segment_{index}.wav"))
    }
}

impl SegmentExporter for WavSegmentExporter {
    fn export(
        &self,
        index: usize,
        audio: &AudioClip,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path_for(index);
        let spec = WavSpec {
            channels: audio.channels(),
            sample_rate: audio.sample_rate(),
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(&path, spec)?;
        for &sample in audio.samples() {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        log::debug!("Exported segment {index} to {}", path.display());
        Ok(path)
    }
}
