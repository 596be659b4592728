use thiserror::Error;

use crate::pipeline::segment_result::SegmentFailure;

/// Boxed error returned by external collaborators (media, recognition,
/// translation, synthesis). Must be `Send` to cross worker threads.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Run-level failures. Per-segment stage failures are not errors at this
/// level; they are carried as values in `SegmentResult`.
#[derive(Error, Debug)]
pub enum DubError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{} of {total} segments failed: {}", .failures.len(), describe(.failures))]
    IncompleteRun {
        total: usize,
        failures: Vec<SegmentFailure>,
    },
    #[error("media error: {0}")]
    Media(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DubError {
    /// Indices of the failed segments, for `IncompleteRun`.
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            DubError::IncompleteRun { failures, .. } => failures.iter().map(|f| f.index).collect(),
            _ => Vec::new(),
        }
    }
}

fn describe(failures: &[SegmentFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::segment_result::{FailureCause, PipelineStage};

    #[test]
    fn test_incomplete_run_lists_failed_indices() {
        let err = DubError::IncompleteRun {
            total: 5,
            failures: vec![
                SegmentFailure {
                    index: 1,
                    stage: PipelineStage::Transcribe,
                    cause: FailureCause::Service("no speech service".into()),
                },
                SegmentFailure {
                    index: 3,
                    stage: PipelineStage::Synthesize,
                    cause: FailureCause::Cancelled,
                },
            ],
        };
        assert_eq!(err.failed_indices(), vec![1, 3]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 of 5 segments failed"), "got: {msg}");
        assert!(msg.contains("segment 1"));
        assert!(msg.contains("transcribe"));
        assert!(msg.contains("cancelled"));
    }

    #[test]
    fn test_other_variants_have_no_failed_indices() {
        let err = DubError::InvalidInput("bad".into());
        assert!(err.failed_indices().is_empty());
        assert_eq!(err.to_string(), "invalid input: bad");
    }
}
