use std::path::Path;

use crate::audio::domain::segment_exporter::SegmentExporter;
use crate::segmentation::domain::segment::{compute_segments, Segment};
use crate::shared::error::DubError;
use crate::video::domain::audio_muxer::AudioMuxer;

use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::reassembler::Reassembler;
use super::run_context::RunContext;
use super::run_report::RunReport;
use super::segment_executor::{retry_failed, ExecutorConfig, SegmentExecutor};
use super::segment_pipeline::{SegmentPipeline, SegmentServices};
use super::segment_result::SegmentResult;

/// Segments, results and report of a run whose segments have all been
/// attempted. Nothing has been written yet.
pub struct ProcessedRun {
    segments: Vec<Segment>,
    results: Vec<SegmentResult>,
    report: RunReport,
}

impl ProcessedRun {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn results(&self) -> &[SegmentResult] {
        &self.results
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }
}

/// Dubs one input file.
///
/// Wires media source, segmenter, executor, reassembler and muxer. Split in
/// two phases so callers can persist the report of an incomplete run before
/// it is turned into an error.
pub struct DubVideoUseCase {
    services: SegmentServices,
    executor: Box<dyn SegmentExecutor>,
    muxer: Box<dyn AudioMuxer>,
    exporter: Option<Box<dyn SegmentExporter>>,
    logger: Box<dyn PipelineLogger>,
}

impl DubVideoUseCase {
    pub fn new(
        services: SegmentServices,
        executor: Box<dyn SegmentExecutor>,
        muxer: Box<dyn AudioMuxer>,
    ) -> Self {
        Self {
            services,
            executor,
            muxer,
            exporter: None,
            logger: Box::new(NullPipelineLogger),
        }
    }

    pub fn with_exporter(mut self, exporter: Box<dyn SegmentExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Segments the input and runs every segment through the pipeline,
    /// retrying failures up to `max_retries` rounds.
    pub fn process(&mut self, ctx: &RunContext) -> Result<ProcessedRun, DubError> {
        let config = ctx.config();
        let duration = self.services.media.duration();
        let segments = compute_segments(duration, config.segment_duration_secs)?;
        self.logger.info(&format!(
            "{:.2}s of input in {} segments of {}s, {} worker(s), {} -> {}",
            duration,
            segments.len(),
            config.segment_duration_secs,
            config.concurrency.min(segments.len()),
            ctx.languages().source,
            ctx.languages().target,
        ));

        let pipeline = SegmentPipeline::new(
            self.services.clone(),
            ctx.languages().clone(),
            config.stage_timeout(),
        );
        let exec_config = ExecutorConfig {
            concurrency: config.concurrency,
            cancelled: ctx.cancel_flag(),
        };

        let mut results =
            self.executor
                .execute(&segments, &pipeline, &exec_config, self.logger.as_mut());

        for round in 1..=config.max_retries {
            if ctx.is_cancelled() {
                break;
            }
            let retried = retry_failed(
                self.executor.as_ref(),
                &segments,
                &mut results,
                &pipeline,
                &exec_config,
                self.logger.as_mut(),
            );
            if retried == 0 {
                break;
            }
            log::info!("Retry round {round}: re-ran {retried} segment(s)");
        }

        self.logger.summary();
        let report = RunReport::new(&segments, &results);
        report.log();

        Ok(ProcessedRun {
            segments,
            results,
            report,
        })
    }

    /// Reassembles the dubbed track and writes `output_path`.
    ///
    /// Fails with [`DubError::IncompleteRun`] without writing anything if any
    /// segment failed.
    pub fn finish(
        &mut self,
        ctx: &RunContext,
        run: &ProcessedRun,
        output_path: &Path,
    ) -> Result<(), DubError> {
        let track = Reassembler::assemble(&run.results)?;
        self.logger.metric("output_audio_secs", track.duration());

        if let Some(exporter) = &self.exporter {
            for result in &run.results {
                if let Some(success) = result.as_success() {
                    exporter
                        .export(result.index, &success.audio)
                        .map_err(|e| DubError::Media(format!("segment {}: {e}", result.index)))?;
                }
            }
        }

        self.muxer
            .mux(ctx.input(), &track, output_path)
            .map_err(|e| DubError::Media(format!("cannot write {}: {e}", output_path.display())))?;
        self.logger.info(&format!("Wrote {}", output_path.display()));
        Ok(())
    }

    /// [`process`](Self::process) followed by [`finish`](Self::finish).
    pub fn execute(&mut self, ctx: &RunContext, output_path: &Path) -> Result<RunReport, DubError> {
        let run = self.process(ctx)?;
        self.finish(ctx, &run, output_path)?;
        Ok(run.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::domain::audio_clip::AudioClip;
    use crate::audio::domain::transcription_service::TranscriptionService;
    use crate::pipeline::infrastructure::worker_pool_executor::WorkerPoolExecutor;
    use crate::pipeline::segment_pipeline::test_support::*;
    use crate::pipeline::segment_result::{FailureCause, PipelineStage};
    use crate::shared::error::ServiceError;
    use crate::shared::language::LanguageCode;
    use crate::shared::run_config::RunConfig;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct StubMuxer {
        written: Arc<Mutex<Option<(PathBuf, AudioClip, PathBuf)>>>,
    }

    impl AudioMuxer for StubMuxer {
        fn mux(
            &self,
            source_path: &Path,
            audio: &AudioClip,
            output_path: &Path,
        ) -> Result<(), Box<dyn std::error::Error>> {
            *self.written.lock().unwrap() = Some((
                source_path.to_path_buf(),
                audio.clone(),
                output_path.to_path_buf(),
            ));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct StubExporter {
        exported: Arc<Mutex<Vec<(usize, usize)>>>,
    }

    impl SegmentExporter for StubExporter {
        fn export(
            &self,
            index: usize,
            audio: &AudioClip,
        ) -> Result<PathBuf, Box<dyn std::error::Error>> {
            self.exported
                .lock()
                .unwrap()
                .push((index, audio.samples().len()));
            Ok(PathBuf::from(format!("segment_{index}.wav")))
        }
    }

    /// Fails each listed clip on its first attempt only.
    struct FlakyTranscriber {
        flaky: Mutex<HashSet<usize>>,
    }

    impl TranscriptionService for FlakyTranscriber {
        fn transcribe(&self, audio: &AudioClip, language: &LanguageCode) -> Result<String, ServiceError> {
            let first = audio.samples().first().map(|s| *s as usize).unwrap_or_default();
            if self.flaky.lock().unwrap().remove(&first) {
                return Err("connection reset".into());
            }
            StubTranscriber::default().transcribe(audio, language)
        }
    }

    fn context(max_retries: u32) -> RunContext {
        let config = RunConfig {
            segment_duration_secs: 30.0,
            concurrency: 2,
            max_retries,
            ..RunConfig::default()
        };
        RunContext::new(Path::new("talk.mp4"), config).unwrap()
    }

    fn use_case(services: SegmentServices, muxer: StubMuxer) -> DubVideoUseCase {
        DubVideoUseCase::new(
            services,
            Box::new(WorkerPoolExecutor::new()),
            Box::new(muxer),
        )
    }

    #[test]
    fn test_complete_run_writes_joined_track() {
        let muxer = StubMuxer::default();
        let written = muxer.written.clone();
        let mut uc = use_case(
            services(StubMedia::new(75.0), StubTranscriber::default()),
            muxer,
        );
        let ctx = context(0);

        let report = uc.execute(&ctx, Path::new("talk.hi.mp4")).unwrap();
        assert_eq!(report.total, 3);
        assert!(report.is_complete());

        let (source, track, output) = written.lock().unwrap().clone().unwrap();
        assert_eq!(source, PathBuf::from("talk.mp4"));
        assert_eq!(output, PathBuf::from("talk.hi.mp4"));
        let expected: usize = ["[hi] en:0-3000", "[hi] en:3000-3000", "[hi] en:6000-1500"]
            .iter()
            .map(|t| t.len())
            .sum();
        assert_eq!(track.samples().len(), expected);
    }

    #[test]
    fn test_failed_segment_blocks_output() {
        let mut transcriber = StubTranscriber::default();
        transcriber.fail_first_sample.insert(3000);
        let muxer = StubMuxer::default();
        let written = muxer.written.clone();
        let mut uc = use_case(services(StubMedia::new(75.0), transcriber), muxer);
        let ctx = context(0);

        let run = uc.process(&ctx).unwrap();
        assert_eq!(run.report().failed, 1);
        assert_eq!(run.results()[0].index, 0);
        assert!(run.results()[0].is_success());
        assert!(run.results()[2].is_success());

        let err = uc.finish(&ctx, &run, Path::new("out.mp4")).unwrap_err();
        assert_eq!(err.failed_indices(), vec![1]);
        match err {
            DubError::IncompleteRun { failures, .. } => {
                assert_eq!(failures[0].stage, PipelineStage::Transcribe);
            }
            other => panic!("expected IncompleteRun, got {other:?}"),
        }
        assert!(written.lock().unwrap().is_none());
    }

    #[test]
    fn test_retries_recover_transient_failures() {
        let flaky = FlakyTranscriber {
            flaky: Mutex::new(HashSet::from([0, 6000])),
        };
        let services = SegmentServices {
            transcriber: Arc::new(flaky),
            ..services(StubMedia::new(75.0), StubTranscriber::default())
        };
        let mut uc = use_case(services, StubMuxer::default());

        let report = uc.execute(&context(1), Path::new("out.mp4")).unwrap();
        assert!(report.is_complete());
    }

    #[test]
    fn test_without_retries_transient_failures_remain() {
        let flaky = FlakyTranscriber {
            flaky: Mutex::new(HashSet::from([6000])),
        };
        let services = SegmentServices {
            transcriber: Arc::new(flaky),
            ..services(StubMedia::new(75.0), StubTranscriber::default())
        };
        let mut uc = use_case(services, StubMuxer::default());

        let err = uc.execute(&context(0), Path::new("out.mp4")).unwrap_err();
        assert_eq!(err.failed_indices(), vec![2]);
    }

    #[test]
    fn test_cancelled_context_fails_every_segment() {
        let mut uc = use_case(
            services(StubMedia::new(75.0), StubTranscriber::default()),
            StubMuxer::default(),
        );
        let ctx = context(3);
        ctx.cancel();

        let run = uc.process(&ctx).unwrap();
        assert_eq!(run.report().failed, 3);
        assert!(run
            .report()
            .failures()
            .all(|r| r.cause == Some(FailureCause::Cancelled.to_string())));
    }

    #[test]
    fn test_exporter_receives_every_segment() {
        let exporter = StubExporter::default();
        let exported = exporter.exported.clone();
        let mut uc = use_case(
            services(StubMedia::new(60.0), StubTranscriber::default()),
            StubMuxer::default(),
        )
        .with_exporter(Box::new(exporter));

        uc.execute(&context(0), Path::new("out.mp4")).unwrap();
        let exported = exported.lock().unwrap();
        let indices: Vec<usize> = exported.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        // 60s at 30s per segment leaves an empty tail.
        assert_eq!(exported[2].1, 0);
    }

    #[test]
    fn test_invalid_media_duration_is_rejected() {
        let mut uc = use_case(
            services(StubMedia::new(f64::NAN), StubTranscriber::default()),
            StubMuxer::default(),
        );
        assert!(matches!(
            uc.process(&context(0)),
            Err(DubError::InvalidInput(_))
        ));
    }
}
