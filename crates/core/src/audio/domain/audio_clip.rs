/// A self-contained piece of decoded audio: interleaved PCM samples
/// normalized to [-1.0, 1.0].
///
/// This is the asset type that flows between pipeline stages. Each clip owns
/// its samples, so dropping it releases the asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// A clip with no samples. Used for zero-length segments and empty text.
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(Vec::new(), sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Index of the first interleaved sample at `time`, aligned to a frame boundary.
    pub fn sample_index_at_time(&self, time: f64) -> usize {
        let frame = (time.max(0.0) * self.sample_rate as f64).round() as usize;
        frame * self.channels as usize
    }

    /// Copies `[start, end)` seconds into a new clip, clamped to the clip bounds.
    pub fn slice(&self, start: f64, end: f64) -> AudioClip {
        let len = self.samples.len();
        let from = self.sample_index_at_time(start).min(len);
        let to = self.sample_index_at_time(end).min(len).max(from);
        AudioClip::new(self.samples[from..to].to_vec(), self.sample_rate, self.channels)
    }

    pub fn same_format(&self, other: &AudioClip) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Appends `other`. Both clips must share sample rate and channel count.
    pub fn append(&mut self, other: &AudioClip) -> Result<(), String> {
        if !self.same_format(other) {
            return Err(format!(
                "cannot append {} Hz/{} ch audio to {} Hz/{} ch audio",
                other.sample_rate, other.channels, self.sample_rate, self.channels
            ));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }
}
