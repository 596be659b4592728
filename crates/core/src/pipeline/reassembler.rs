use crate::audio::domain::audio_clip::AudioClip;
use crate::shared::error::DubError;

use super::segment_result::{collect_failures, SegmentResult};

/// Joins the synthesized segments back into one track.
pub struct Reassembler;

impl Reassembler {
    /// Concatenates the synthesized audio of `results` in index order.
    ///
    /// Every result must be a success and `results[i].index == i`; otherwise
    /// nothing is assembled. Synthesized durations are kept as produced, so
    /// the track length generally differs from the source.
    pub fn assemble(results: &[SegmentResult]) -> Result<AudioClip, DubError> {
        let failures = collect_failures(results);
        if !failures.is_empty() {
            return Err(DubError::IncompleteRun {
                total: results.len(),
                failures,
            });
        }

        if let Some((position, result)) = results
            .iter()
            .enumerate()
            .find(|(position, result)| result.index != *position)
        {
            return Err(DubError::InvalidInput(format!(
                "result at position {position} belongs to segment {}",
                result.index
            )));
        }

        let mut clips = results.iter().filter_map(SegmentResult::as_success).map(|s| &s.audio);
        let Some(first) = clips.next() else {
            return Err(DubError::InvalidInput("no segments to reassemble".into()));
        };

        let capacity = results
            .iter()
            .filter_map(SegmentResult::as_success)
            .map(|s| s.audio.samples().len())
            .sum();
        let mut samples = Vec::with_capacity(capacity);
        samples.extend_from_slice(first.samples());
        let mut track = AudioClip::new(samples, first.sample_rate(), first.channels());

        for clip in clips {
            track.append(clip).map_err(DubError::Media)?;
        }
        Ok(track)
    }
}
