use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::segmentation::domain::segment::Segment;
use crate::shared::error::DubError;

use super::segment_result::{PipelineStage, SegmentOutcome, SegmentResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Ok,
    Failed,
}

/// One row of the run report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub status: SegmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesized_secs: Option<f64>,
}

/// Per-segment status of a run, in index order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub segments: Vec<SegmentReport>,
}

impl RunReport {
    /// `segments` and `results` are matched by position.
    pub fn new(segments: &[Segment], results: &[SegmentResult]) -> Self {
        let rows: Vec<SegmentReport> = segments
            .iter()
            .zip(results)
            .map(|(segment, result)| row(segment, result))
            .collect();
        let succeeded = rows.iter().filter(|r| r.status == SegmentStatus::Ok).count();
        Self {
            total: rows.len(),
            succeeded,
            failed: rows.len() - succeeded,
            segments: rows,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments
            .iter()
            .filter(|r| r.status == SegmentStatus::Failed)
    }

    pub fn to_json(&self) -> Result<String, DubError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DubError::InvalidInput(format!("cannot serialize report: {e}")))
    }

    pub fn write(&self, path: &Path) -> Result<(), DubError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Writes one line per segment through `log`.
    pub fn log(&self) {
        for r in &self.segments {
            match r.status {
                SegmentStatus::Ok => log::info!(
                    "  segment {:>3} [{:>8.2}s, {:>8.2}s)  ok      {:.2}s synthesized",
                    r.index,
                    r.start,
                    r.end,
                    r.synthesized_secs.unwrap_or_default()
                ),
                SegmentStatus::Failed => log::info!(
                    "  segment {:>3} [{:>8.2}s, {:>8.2}s)  FAILED  at {}: {}",
                    r.index,
                    r.start,
                    r.end,
                    r.stage.map(|s| s.name()).unwrap_or("?"),
                    r.cause.as_deref().unwrap_or("")
                ),
            }
        }
        log::info!("{} of {} segments succeeded", self.succeeded, self.total);
    }
}

fn row(segment: &Segment, result: &SegmentResult) -> SegmentReport {
    let mut report = SegmentReport {
        index: segment.index(),
        start: segment.start(),
        end: segment.end(),
        status: SegmentStatus::Ok,
        stage: None,
        cause: None,
        source_text: None,
        translated_text: None,
        synthesized_secs: None,
    };
    match &result.outcome {
        SegmentOutcome::Success(success) => {
            report.source_text = Some(success.source_text.clone());
            report.translated_text = Some(success.translated_text.clone());
            report.synthesized_secs = Some(success.audio.duration());
        }
        SegmentOutcome::Failure { stage, cause } => {
            report.status = SegmentStatus::Failed;
            report.stage = Some(*stage);
            report.cause = Some(cause.to_string());
        }
    }
    report
}
