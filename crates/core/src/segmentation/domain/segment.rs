use serde::Serialize;

use crate::shared::constants::MAX_SEGMENTS;
use crate::shared::error::DubError;

/// A contiguous, half-open time range `[start, end)` of the source, in seconds.
///
/// Only the segmenter builds these, so a segment sequence is always dense
/// (indices 0..n), gapless, and covers `[0, total_duration]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Segment {
    index: usize,
    start: f64,
    end: f64,
}

impl Segment {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The trailing segment emitted when the total duration is an exact
    /// multiple of the segment length.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Splits `[0, total_duration)` into fixed-length segments.
///
/// Always emits `floor(total / length) + 1` segments; the last one is shorter
/// than `segment_length`, and zero-length when `total_duration` is an exact
/// multiple. Zero-length segments flow through the pipeline as empty audio.
pub fn compute_segments(total_duration: f64, segment_length: f64) -> Result<Vec<Segment>, DubError> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(DubError::InvalidInput(format!(
            "total duration must be positive, got {total_duration}"
        )));
    }
    if !segment_length.is_finite() || segment_length <= 0.0 {
        return Err(DubError::InvalidInput(format!(
            "segment length must be positive, got {segment_length}"
        )));
    }

    let full = (total_duration / segment_length).floor();
    if !full.is_finite() || full >= MAX_SEGMENTS as f64 {
        return Err(DubError::InvalidInput(format!(
            "{total_duration}s in {segment_length}s segments exceeds {MAX_SEGMENTS} segments"
        )));
    }
    let count = (full as usize).checked_add(1).ok_or_else(|| {
        DubError::InvalidInput(format!("segment count overflows for {total_duration}s"))
    })?;

    // Boundaries come from the same expression on both sides, so
    // `segments[i].end == segments[i + 1].start` holds exactly.
    let boundary = |i: usize| {
        if i >= count {
            total_duration
        } else {
            (i as f64 * segment_length).min(total_duration)
        }
    };

    Ok((0..count)
        .map(|index| Segment {
            index,
            start: boundary(index),
            end: boundary(index + 1),
        })
        .collect())
}

#[cfg(test)]
pub(crate) fn segment(index: usize, start: f64, end: f64) -> Segment {
    Segment { index, start, end }
}
