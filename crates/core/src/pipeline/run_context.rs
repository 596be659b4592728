use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::shared::error::DubError;
use crate::shared::language::LanguagePair;
use crate::shared::run_config::RunConfig;
use crate::shared::scratch::ScratchSpace;

/// State for one invocation: input, validated settings, cancellation flag
/// and scratch storage.
///
/// Dropping the context removes every intermediate file the run created,
/// whether it succeeded or not.
pub struct RunContext {
    input: PathBuf,
    config: RunConfig,
    languages: LanguagePair,
    cancelled: Arc<AtomicBool>,
    scratch: ScratchSpace,
}

impl RunContext {
    /// Validates `config` before anything else is touched.
    pub fn new(input: &Path, config: RunConfig) -> Result<Self, DubError> {
        config.validate()?;
        let languages = config.language_pair()?;
        Ok(Self {
            input: input.to_path_buf(),
            config,
            languages,
            cancelled: Arc::new(AtomicBool::new(false)),
            scratch: ScratchSpace::new()?,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguagePair {
        &self.languages
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Shared flag; raise it from any thread to stop dispatching segments.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected_before_scratch_is_created() {
        let config = RunConfig {
            concurrency: 0,
            ..RunConfig::default()
        };
        let result = RunContext::new(Path::new("in.mp4"), config);
        assert!(matches!(result, Err(DubError::InvalidInput(_))));
    }

    #[test]
    fn test_cancel_is_visible_through_shared_flag() {
        let ctx = RunContext::new(Path::new("in.mp4"), RunConfig::default()).unwrap();
        let flag = ctx.cancel_flag();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(flag.load(Ordering::Relaxed));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_scratch_removed_with_context() {
        let ctx = RunContext::new(Path::new("in.mp4"), RunConfig::default()).unwrap();
        let dir = ctx.scratch().path().to_path_buf();
        std::fs::write(dir.join("leftover.wav"), b"x").unwrap();
        assert!(dir.exists());
        drop(ctx);
        assert!(!dir.exists());
    }
}
