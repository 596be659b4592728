use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::segmentation::domain::segment::Segment;

use super::pipeline_logger::PipelineLogger;
use super::segment_pipeline::SegmentPipeline;
use super::segment_result::{FailureCause, SegmentOutcome, SegmentResult};

/// Configuration for one executor run.
pub struct ExecutorConfig {
    /// Upper bound on segments processed at the same time.
    pub concurrency: usize,
    /// Once raised, no further segments are started.
    pub cancelled: Arc<AtomicBool>,
}

/// Abstracts how segment pipelines are dispatched.
///
/// This is a port (application-layer interface). Infrastructure provides the
/// concrete scheduling strategy.
pub trait SegmentExecutor: Send {
    /// Runs `pipeline` over every segment and returns one result per
    /// segment, in the order of `segments`, whatever the completion order.
    /// Failed segments do not stop their siblings.
    fn execute(
        &self,
        segments: &[Segment],
        pipeline: &SegmentPipeline,
        config: &ExecutorConfig,
        logger: &mut dyn PipelineLogger,
    ) -> Vec<SegmentResult>;
}

/// Re-submits failed segments through `executor` and splices the fresh
/// results into `results` at their original positions.
///
/// Cancelled segments are left alone. Returns how many segments were retried.
pub fn retry_failed(
    executor: &dyn SegmentExecutor,
    segments: &[Segment],
    results: &mut [SegmentResult],
    pipeline: &SegmentPipeline,
    config: &ExecutorConfig,
    logger: &mut dyn PipelineLogger,
) -> usize {
    let positions: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| is_retryable(r))
        .map(|(pos, _)| pos)
        .collect();
    if positions.is_empty() {
        return 0;
    }

    let retry_segments: Vec<Segment> = positions.iter().map(|&pos| segments[pos]).collect();
    let indices: Vec<usize> = retry_segments.iter().map(|s| s.index()).collect();
    logger.info(&format!("Retrying segments {indices:?}"));

    let fresh = executor.execute(&retry_segments, pipeline, config, logger);
    for (pos, result) in positions.into_iter().zip(fresh) {
        results[pos] = result;
    }
    indices.len()
}

fn is_retryable(result: &SegmentResult) -> bool {
    matches!(
        &result.outcome,
        SegmentOutcome::Failure { cause, .. } if *cause != FailureCause::Cancelled
    )
}
