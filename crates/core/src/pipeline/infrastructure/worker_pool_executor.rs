use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::segment_executor::{ExecutorConfig, SegmentExecutor};
use crate::pipeline::segment_pipeline::SegmentPipeline;
use crate::pipeline::segment_result::{FailureCause, PipelineStage, SegmentResult};
use crate::segmentation::domain::segment::Segment;

/// Work item: position in the caller's slice plus the segment itself.
type Job<'a> = (usize, &'a Segment);

enum WorkerEvent {
    StageTimed(PipelineStage, Duration),
    Finished { index: usize, success: bool },
}

/// Executes segment pipelines on a fixed pool of OS threads.
///
/// Layout: `queue → N workers → results[position]`, with worker events
/// (stage timings, completions) funnelled back to the calling thread.
///
/// Each position of the result vector is a write-once slot owned by the
/// worker that dequeued the matching job, so output order is the input
/// order and no sorting happens afterwards.
pub struct WorkerPoolExecutor;

impl WorkerPoolExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkerPoolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentExecutor for WorkerPoolExecutor {
    fn execute(
        &self,
        segments: &[Segment],
        pipeline: &SegmentPipeline,
        config: &ExecutorConfig,
        logger: &mut dyn PipelineLogger,
    ) -> Vec<SegmentResult> {
        let total = segments.len();
        if total == 0 {
            return Vec::new();
        }

        let slots: Vec<OnceLock<SegmentResult>> = (0..total).map(|_| OnceLock::new()).collect();

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        for job in segments.iter().enumerate() {
            // The receiver is alive in this scope; send cannot fail.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let workers = config.concurrency.clamp(1, total);
        log::info!("Dispatching {total} segments to {workers} workers");

        let (event_tx, event_rx) = crossbeam_channel::unbounded::<WorkerEvent>();
        let cancelled: &AtomicBool = &config.cancelled;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for worker_id in 0..workers {
                let job_rx = job_rx.clone();
                let event_tx = event_tx.clone();
                let slots = &slots;
                let spawned = thread::Builder::new()
                    .name(format!("segment-worker-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        run_worker(job_rx, slots, pipeline, cancelled, event_tx)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => log::error!("Failed to spawn segment worker {worker_id}: {e}"),
                }
            }
            drop(event_tx);

            drain_events(event_rx, total, logger);

            for handle in handles {
                if handle.join().is_err() {
                    log::error!("Segment worker panicked");
                }
            }
        });

        collect_results(slots, segments, cancelled.load(Ordering::Relaxed))
    }
}

fn run_worker(
    job_rx: Receiver<Job<'_>>,
    slots: &[OnceLock<SegmentResult>],
    pipeline: &SegmentPipeline,
    cancelled: &AtomicBool,
    events: Sender<WorkerEvent>,
) {
    loop {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        let Ok((position, segment)) = job_rx.recv() else {
            break;
        };

        let result = pipeline.process_with(segment, cancelled, &mut |stage, elapsed| {
            let _ = events.send(WorkerEvent::StageTimed(stage, elapsed));
        });
        let success = result.is_success();

        if slots[position].set(result).is_err() {
            log::error!("Segment {} was processed twice", segment.index());
        }
        let _ = events.send(WorkerEvent::Finished {
            index: segment.index(),
            success,
        });
    }
}

/// Feeds worker events to the logger until every worker has exited.
fn drain_events(events: Receiver<WorkerEvent>, total: usize, logger: &mut dyn PipelineLogger) {
    let mut completed = 0;
    for event in events {
        match event {
            WorkerEvent::StageTimed(stage, elapsed) => {
                logger.timing(stage.name(), elapsed.as_secs_f64() * 1000.0);
            }
            WorkerEvent::Finished { index, success } => {
                completed += 1;
                if !success {
                    logger.metric("failed_segments", 1.0);
                    log::debug!("Segment {index} finished with failure");
                }
                logger.progress(completed, total);
            }
        }
    }
}

/// Unwraps the slots in position order. Empty slots were never finished:
/// either not dequeued before cancellation, or lost with a panicked worker.
fn collect_results(
    slots: Vec<OnceLock<SegmentResult>>,
    segments: &[Segment],
    cancelled: bool,
) -> Vec<SegmentResult> {
    slots
        .into_iter()
        .zip(segments)
        .map(|(slot, segment)| {
            slot.into_inner().unwrap_or_else(|| {
                let cause = if cancelled {
                    FailureCause::Cancelled
                } else {
                    FailureCause::Aborted("worker exited before finishing the segment".into())
                };
                SegmentResult::failure(segment.index(), PipelineStage::Extract, cause)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::hash_map::RandomState;
    use std::collections::HashSet;
    use std::hash::BuildHasher;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    use crate::audio::domain::audio_clip::AudioClip;
    use crate::audio::domain::transcription_service::TranscriptionService;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::pipeline::segment_executor::retry_failed;
    use crate::pipeline::segment_pipeline::test_support::*;
    use crate::pipeline::segment_pipeline::{SegmentPipeline, SegmentServices};
    use crate::pipeline::segment_result::SegmentOutcome;
    use crate::segmentation::domain::segment::compute_segments;
    use crate::shared::error::ServiceError;
    use crate::shared::language::LanguageCode;

    fn config(concurrency: usize) -> ExecutorConfig {
        ExecutorConfig {
            concurrency,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn run(segments: &[Segment], pipeline: &SegmentPipeline, concurrency: usize) -> Vec<SegmentResult> {
        WorkerPoolExecutor::new().execute(segments, pipeline, &config(concurrency), &mut NullPipelineLogger)
    }

    fn assert_index_ordered(results: &[SegmentResult], segments: &[Segment]) {
        assert_eq!(results.len(), segments.len());
        for (result, segment) in results.iter().zip(segments) {
            assert_eq!(result.index, segment.index());
        }
    }

    /// Random delay in [0, 15) ms per call; the hasher is freshly seeded per run.
    fn random_delay() -> Box<dyn Fn(usize) -> Duration + Send + Sync> {
        let state = RandomState::new();
        Box::new(move |key| Duration::from_millis(state.hash_one(key) % 15))
    }

    #[test]
    fn test_results_are_index_ordered_under_random_delays() {
        for (duration, concurrency) in [(95.0, 1), (95.0, 3), (200.0, 8), (200.0, 20), (50.0, 50)] {
            let segments = compute_segments(duration, 10.0).unwrap();
            let transcriber = StubTranscriber {
                delay: Some(random_delay()),
                ..Default::default()
            };
            let pipeline = pipeline(StubMedia::new(duration), transcriber);

            let results = run(&segments, &pipeline, concurrency);

            assert_index_ordered(&results, &segments);
            for (result, segment) in results.iter().zip(&segments) {
                let success = result.as_success().expect("all segments succeed");
                if !segment.is_empty() {
                    let first = (segment.start() * RATE as f64).round() as usize;
                    assert!(success.source_text.starts_with(&format!("en:{first}-")));
                }
            }
        }
    }

    #[test]
    fn test_one_failure_leaves_siblings_intact() {
        let segments = compute_segments(45.0, 10.0).unwrap();
        assert_eq!(segments.len(), 5);
        let mut transcriber = StubTranscriber::default();
        transcriber.fail_first_sample.insert(2000);
        let pipeline = pipeline(StubMedia::new(45.0), transcriber);

        let results = run(&segments, &pipeline, 3);

        assert_index_ordered(&results, &segments);
        for (i, result) in results.iter().enumerate() {
            if i == 2 {
                let failure = result.as_failure().unwrap();
                assert_eq!(failure.stage, PipelineStage::Transcribe);
                assert_eq!(failure.index, 2);
            } else {
                assert!(result.is_success(), "segment {i} should succeed");
            }
        }
    }

    #[test]
    fn test_every_segment_processed_exactly_once() {
        let segments = compute_segments(300.0, 7.0).unwrap();
        let transcriber = Arc::new(StubTranscriber::default());
        let services = SegmentServices {
            transcriber: transcriber.clone(),
            ..services(StubMedia::new(300.0), StubTranscriber::default())
        };
        let pipeline = SegmentPipeline::new(services, languages(), Duration::from_secs(10));

        let results = run(&segments, &pipeline, 6);

        assert_index_ordered(&results, &segments);
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), segments.len());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        struct GaugeTranscriber {
            active: AtomicUsize,
            peak: AtomicUsize,
        }
        impl TranscriptionService for GaugeTranscriber {
            fn transcribe(&self, _: &AudioClip, _: &LanguageCode) -> Result<String, ServiceError> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(String::new())
            }
        }
        let gauge = Arc::new(GaugeTranscriber {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let services = SegmentServices {
            transcriber: gauge.clone(),
            ..services(StubMedia::new(120.0), StubTranscriber::default())
        };
        let pipeline = SegmentPipeline::new(services, languages(), Duration::from_secs(10));
        let segments = compute_segments(120.0, 5.0).unwrap();

        let results = run(&segments, &pipeline, 3);

        assert_eq!(results.len(), segments.len());
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak concurrency {peak}");
    }

    #[test]
    fn test_concurrency_larger_than_segment_count() {
        let segments = compute_segments(15.0, 10.0).unwrap();
        let pipeline = pipeline(StubMedia::new(15.0), StubTranscriber::default());
        let results = run(&segments, &pipeline, 64);
        assert_index_ordered(&results, &segments);
        assert!(results.iter().all(SegmentResult::is_success));
    }

    #[test]
    fn test_empty_input_returns_empty_output() {
        let pipeline = pipeline(StubMedia::new(1.0), StubTranscriber::default());
        assert!(run(&[], &pipeline, 4).is_empty());
    }

    #[test]
    fn test_cancel_mid_run_keeps_finished_results() {
        let segments = compute_segments(95.0, 10.0).unwrap();
        assert_eq!(segments.len(), 10);
        let cancelled = Arc::new(AtomicBool::new(false));

        // Segment 1 raises the flag while it is being transcribed.
        struct CancellingTranscriber {
            flag: Arc<AtomicBool>,
        }
        impl TranscriptionService for CancellingTranscriber {
            fn transcribe(&self, audio: &AudioClip, _: &LanguageCode) -> Result<String, ServiceError> {
                let first = audio.samples().first().map(|s| *s as usize).unwrap_or(0);
                if first == 1000 {
                    self.flag.store(true, Ordering::SeqCst);
                }
                Ok(format!("text-{first}"))
            }
        }
        let services = SegmentServices {
            transcriber: Arc::new(CancellingTranscriber {
                flag: cancelled.clone(),
            }),
            ..services(StubMedia::new(95.0), StubTranscriber::default())
        };
        let pipeline = SegmentPipeline::new(services, languages(), Duration::from_secs(10));
        let config = ExecutorConfig {
            concurrency: 1,
            cancelled,
        };

        let results =
            WorkerPoolExecutor::new().execute(&segments, &pipeline, &config, &mut NullPipelineLogger);

        assert_index_ordered(&results, &segments);
        assert!(results[0].is_success(), "finished before cancel");
        let in_flight = results[1].as_failure().unwrap();
        assert_eq!(in_flight.stage, PipelineStage::Translate);
        assert_eq!(in_flight.cause, FailureCause::Cancelled);
        for result in &results[2..] {
            let failure = result.as_failure().unwrap();
            assert_eq!(failure.stage, PipelineStage::Extract);
            assert_eq!(failure.cause, FailureCause::Cancelled);
        }
    }

    /// Segment 3 raises the flag mid-transcription. Every later segment that
    /// reaches the recognizer waits for the flag, so only segments 0 and 1 can
    /// finish, whichever order the workers interleave in.
    #[rstest]
    #[case(2)]
    #[case(4)]
    #[case(8)]
    fn test_cancel_with_parallel_workers(#[case] concurrency: usize) {
        let segments = compute_segments(195.0, 10.0).unwrap();
        let cancelled = Arc::new(AtomicBool::new(false));

        struct GatedTranscriber {
            flag: Arc<AtomicBool>,
        }
        impl TranscriptionService for GatedTranscriber {
            fn transcribe(&self, audio: &AudioClip, _: &LanguageCode) -> Result<String, ServiceError> {
                let first = audio.samples().first().map(|s| *s as usize).unwrap_or(0);
                if first == 3000 {
                    self.flag.store(true, Ordering::SeqCst);
                } else if first >= 2000 {
                    let deadline = std::time::Instant::now() + Duration::from_secs(5);
                    while !self.flag.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
                Ok(format!("text-{first}"))
            }
        }
        let services = SegmentServices {
            transcriber: Arc::new(GatedTranscriber {
                flag: cancelled.clone(),
            }),
            ..services(StubMedia::new(195.0), StubTranscriber::default())
        };
        let pipeline = SegmentPipeline::new(services, languages(), Duration::from_secs(10));
        let config = ExecutorConfig {
            concurrency,
            cancelled,
        };

        let results =
            WorkerPoolExecutor::new().execute(&segments, &pipeline, &config, &mut NullPipelineLogger);

        assert_index_ordered(&results, &segments);
        for (i, (result, segment)) in results.iter().zip(&segments).enumerate() {
            match &result.outcome {
                SegmentOutcome::Success(success) => {
                    assert!(i < 2, "segment {i} finished after cancellation");
                    let first = (segment.start() * RATE as f64).round() as usize;
                    assert_eq!(success.source_text, format!("text-{first}"));
                    assert!(!success.audio.is_empty());
                }
                SegmentOutcome::Failure { cause, .. } => {
                    assert_eq!(*cause, FailureCause::Cancelled, "segment {i}");
                }
            }
        }

        // In flight when the flag went up: cancelled before translation.
        let raiser = results[3].as_failure().unwrap();
        assert_eq!(raiser.stage, PipelineStage::Translate);
        // Never dequeued before the flag went up.
        for result in &results[concurrency + 2..] {
            assert_eq!(result.as_failure().unwrap().stage, PipelineStage::Extract);
        }
    }

    #[test]
    fn test_logger_receives_progress_and_timings() {
        #[derive(Default)]
        struct Recording {
            progress: Vec<(usize, usize)>,
            stages: HashSet<String>,
            failed: usize,
        }
        struct SharedLogger(Arc<Mutex<Recording>>);
        impl PipelineLogger for SharedLogger {
            fn progress(&mut self, current: usize, total: usize) {
                self.0.lock().unwrap().progress.push((current, total));
            }
            fn timing(&mut self, stage: &str, _: f64) {
                self.0.lock().unwrap().stages.insert(stage.to_string());
            }
            fn metric(&mut self, name: &str, _: f64) {
                if name == "failed_segments" {
                    self.0.lock().unwrap().failed += 1;
                }
            }
            fn info(&mut self, _: &str) {}
        }

        let segments = compute_segments(35.0, 10.0).unwrap();
        let mut transcriber = StubTranscriber::default();
        transcriber.fail_first_sample.insert(1000);
        let pipeline = pipeline(StubMedia::new(35.0), transcriber);
        let recording = Arc::new(Mutex::new(Recording::default()));
        let mut logger = SharedLogger(recording.clone());

        WorkerPoolExecutor::new().execute(&segments, &pipeline, &config(2), &mut logger);

        let rec = recording.lock().unwrap();
        let counts: Vec<usize> = rec.progress.iter().map(|(c, _)| *c).collect();
        assert_eq!(counts, vec![1, 2, 3, 4]);
        assert!(rec.progress.iter().all(|(_, t)| *t == 4));
        assert!(rec.stages.contains("extract"));
        assert!(rec.stages.contains("synthesize"));
        assert_eq!(rec.failed, 1);
    }

    #[test]
    fn test_retry_failed_reruns_only_failures() {
        // Fails the first attempt at segment 3, succeeds afterwards.
        struct FlakyTranscriber {
            attempts: Mutex<Vec<usize>>,
        }
        impl TranscriptionService for FlakyTranscriber {
            fn transcribe(&self, audio: &AudioClip, _: &LanguageCode) -> Result<String, ServiceError> {
                let first = audio.samples().first().map(|s| *s as usize).unwrap_or(0);
                let mut attempts = self.attempts.lock().unwrap();
                let seen_before = attempts.contains(&first);
                attempts.push(first);
                if first == 3000 && !seen_before {
                    return Err("temporary outage".into());
                }
                Ok(format!("text-{first}"))
            }
        }
        let flaky = Arc::new(FlakyTranscriber {
            attempts: Mutex::new(Vec::new()),
        });
        let services = SegmentServices {
            transcriber: flaky.clone(),
            ..services(StubMedia::new(55.0), StubTranscriber::default())
        };
        let pipeline = SegmentPipeline::new(services, languages(), Duration::from_secs(10));
        let segments = compute_segments(55.0, 10.0).unwrap();
        let executor = WorkerPoolExecutor::new();
        let cfg = config(4);

        let mut results = executor.execute(&segments, &pipeline, &cfg, &mut NullPipelineLogger);
        assert!(!results[3].is_success());

        let retried = retry_failed(&executor, &segments, &mut results, &pipeline, &cfg, &mut NullPipelineLogger);

        assert_eq!(retried, 1);
        assert_index_ordered(&results, &segments);
        assert!(results.iter().all(SegmentResult::is_success));
        let attempts = flaky.attempts.lock().unwrap();
        assert_eq!(attempts.iter().filter(|&&a| a == 3000).count(), 2);
        assert_eq!(attempts.len(), segments.len() + 1);
        assert!(matches!(
            &results[3].outcome,
            SegmentOutcome::Success(s) if s.source_text == "text-3000"
        ));
    }

    #[test]
    fn test_retry_skips_cancelled_segments() {
        let segments = compute_segments(25.0, 10.0).unwrap();
        let pipeline = pipeline(StubMedia::new(25.0), StubTranscriber::default());
        let mut results: Vec<SegmentResult> = segments
            .iter()
            .map(|s| SegmentResult::failure(s.index(), PipelineStage::Extract, FailureCause::Cancelled))
            .collect();

        let retried = retry_failed(
            &WorkerPoolExecutor::new(),
            &segments,
            &mut results,
            &pipeline,
            &config(2),
            &mut NullPipelineLogger,
        );
        assert_eq!(retried, 0);
        assert!(results.iter().all(|r| !r.is_success()));
    }
}
