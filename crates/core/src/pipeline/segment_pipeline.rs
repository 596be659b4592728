use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::domain::media_source::MediaSource;
use crate::audio::domain::synthesis_service::SynthesisService;
use crate::audio::domain::transcription_service::TranscriptionService;
use crate::audio::domain::translation_service::TranslationService;
use crate::segmentation::domain::segment::Segment;
use crate::shared::error::ServiceError;
use crate::shared::language::LanguagePair;

use super::bounded_call::call_with_timeout;
use super::segment_result::{FailureCause, PipelineStage, SegmentResult, SegmentSuccess};

/// Handles to the external collaborators. Cloning is cheap and every clone
/// talks to the same stateless services.
#[derive(Clone)]
pub struct SegmentServices {
    pub media: Arc<dyn MediaSource>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub translator: Arc<dyn TranslationService>,
    pub synthesizer: Arc<dyn SynthesisService>,
}

/// Callback invoked after each stage with the stage and its wall time.
pub type StageTimer<'a> = &'a mut dyn FnMut(PipelineStage, Duration);

/// Turns one segment into one result: extract → transcribe → translate → synthesize.
///
/// Holds no per-segment state, so one instance is shared by all workers and
/// the same segment can be processed again for a fresh, independent result.
pub struct SegmentPipeline {
    services: SegmentServices,
    languages: LanguagePair,
    stage_timeout: Duration,
}

type StageError = (PipelineStage, FailureCause);

impl SegmentPipeline {
    pub fn new(services: SegmentServices, languages: LanguagePair, stage_timeout: Duration) -> Self {
        Self {
            services,
            languages,
            stage_timeout,
        }
    }

    pub fn process(&self, segment: &Segment) -> SegmentResult {
        let never = AtomicBool::new(false);
        self.process_with(segment, &never, &mut |_, _| {})
    }

    /// Like [`process`](Self::process), checking `cancelled` before each stage.
    /// A stage already in flight always runs to completion or timeout.
    pub fn process_with(
        &self,
        segment: &Segment,
        cancelled: &AtomicBool,
        on_stage: StageTimer<'_>,
    ) -> SegmentResult {
        let index = segment.index();
        match self.run_stages(segment, cancelled, on_stage) {
            Ok(success) => {
                log::debug!(
                    "Segment {index} [{:.2}s, {:.2}s): {} chars -> {} chars, {:.2}s of speech",
                    segment.start(),
                    segment.end(),
                    success.source_text.chars().count(),
                    success.translated_text.chars().count(),
                    success.audio.duration()
                );
                SegmentResult::success(index, success)
            }
            Err((stage, cause)) => {
                if cause != FailureCause::Cancelled {
                    log::warn!("Segment {index} failed at {stage}: {cause}");
                }
                SegmentResult::failure(index, stage, cause)
            }
        }
    }

    fn run_stages(
        &self,
        segment: &Segment,
        cancelled: &AtomicBool,
        on_stage: StageTimer<'_>,
    ) -> Result<SegmentSuccess, StageError> {
        let (start, end) = (segment.start(), segment.end());

        let media = Arc::clone(&self.services.media);
        let extracted = self.stage(PipelineStage::Extract, cancelled, on_stage, move || {
            media.extract_audio_range(start, end)
        })?;

        // The extracted clip moves into the transcription call and is
        // released as soon as that call returns.
        let transcriber = Arc::clone(&self.services.transcriber);
        let source_lang = self.languages.source.clone();
        let source_text = self.stage(PipelineStage::Transcribe, cancelled, on_stage, move || {
            transcriber.transcribe(&extracted, &source_lang)
        })?;

        let translator = Arc::clone(&self.services.translator);
        let (src, dst) = (self.languages.source.clone(), self.languages.target.clone());
        let text = source_text.clone();
        let translated_text = self.stage(PipelineStage::Translate, cancelled, on_stage, move || {
            translator.translate(&text, &src, &dst)
        })?;

        let synthesizer = Arc::clone(&self.services.synthesizer);
        let target_lang = self.languages.target.clone();
        let text = translated_text.clone();
        let audio = self.stage(PipelineStage::Synthesize, cancelled, on_stage, move || {
            synthesizer.synthesize(&text, &target_lang)
        })?;

        Ok(SegmentSuccess {
            audio,
            source_text,
            translated_text,
        })
    }

    fn stage<T, F>(
        &self,
        stage: PipelineStage,
        cancelled: &AtomicBool,
        on_stage: StageTimer<'_>,
        call: F,
    ) -> Result<T, StageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    {
        if cancelled.load(Ordering::Relaxed) {
            return Err((stage, FailureCause::Cancelled));
        }
        let started = Instant::now();
        let result = call_with_timeout(stage.name(), self.stage_timeout, call);
        on_stage(stage, started.elapsed());
        result.map_err(|cause| (stage, cause))
    }
}
