use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::audio::domain::audio_clip::AudioClip;

/// The four steps applied to each segment, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Extract,
    Transcribe,
    Translate,
    Synthesize,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Extract,
        PipelineStage::Transcribe,
        PipelineStage::Translate,
        PipelineStage::Synthesize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Extract => "extract",
            PipelineStage::Transcribe => "transcribe",
            PipelineStage::Translate => "translate",
            PipelineStage::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a stage failed.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum FailureCause {
    #[error("{0}")]
    Service(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("aborted: {0}")]
    Aborted(String),
}

/// Payload of a segment that made it through all four stages.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentSuccess {
    pub audio: AudioClip,
    pub source_text: String,
    pub translated_text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentOutcome {
    Success(SegmentSuccess),
    Failure {
        stage: PipelineStage,
        cause: FailureCause,
    },
}

/// The result for one segment index. Written once by the worker that
/// processed the segment.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentResult {
    pub index: usize,
    pub outcome: SegmentOutcome,
}

impl SegmentResult {
    pub fn success(index: usize, success: SegmentSuccess) -> Self {
        Self {
            index,
            outcome: SegmentOutcome::Success(success),
        }
    }

    pub fn failure(index: usize, stage: PipelineStage, cause: FailureCause) -> Self {
        Self {
            index,
            outcome: SegmentOutcome::Failure { stage, cause },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SegmentOutcome::Success(_))
    }

    pub fn as_success(&self) -> Option<&SegmentSuccess> {
        match &self.outcome {
            SegmentOutcome::Success(s) => Some(s),
            SegmentOutcome::Failure { .. } => None,
        }
    }

    pub fn as_failure(&self) -> Option<SegmentFailure> {
        match &self.outcome {
            SegmentOutcome::Success(_) => None,
            SegmentOutcome::Failure { stage, cause } => Some(SegmentFailure {
                index: self.index,
                stage: *stage,
                cause: cause.clone(),
            }),
        }
    }
}

/// Summary of one failed segment, as reported to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentFailure {
    pub index: usize,
    pub stage: PipelineStage,
    pub cause: FailureCause,
}

impl fmt::Display for SegmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment {} failed at {}: {}",
            self.index, self.stage, self.cause
        )
    }
}

/// Failures in index order.
pub fn collect_failures(results: &[SegmentResult]) -> Vec<SegmentFailure> {
    results.iter().filter_map(SegmentResult::as_failure).collect()
}
