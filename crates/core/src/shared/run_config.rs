use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_SEGMENT_DURATION_SECS, DEFAULT_SOURCE_LANGUAGE, DEFAULT_STAGE_TIMEOUT_SECS,
    DEFAULT_TARGET_LANGUAGE,
};
use super::error::DubError;
use super::language::{LanguageCode, LanguagePair};

/// User-facing settings for one dubbing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub segment_duration_secs: f64,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
    pub concurrency: usize,
    pub stage_timeout_secs: u64,
    /// Extra rounds that re-submit failed segments. 0 disables retries.
    pub max_retries: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: DEFAULT_SEGMENT_DURATION_SECS,
            source_language: LanguageCode::from_static(DEFAULT_SOURCE_LANGUAGE),
            target_language: LanguageCode::from_static(DEFAULT_TARGET_LANGUAGE),
            concurrency: default_concurrency(),
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            max_retries: 0,
        }
    }
}

impl RunConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, DubError> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            DubError::InvalidInput(format!("bad config file {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Rejects configurations that cannot start a run.
    pub fn validate(&self) -> Result<(), DubError> {
        if !self.segment_duration_secs.is_finite() || self.segment_duration_secs <= 0.0 {
            return Err(DubError::InvalidInput(format!(
                "segment duration must be a positive number of seconds, got {}",
                self.segment_duration_secs
            )));
        }
        if self.concurrency == 0 {
            return Err(DubError::InvalidInput("concurrency must be at least 1".into()));
        }
        if self.stage_timeout_secs == 0 {
            return Err(DubError::InvalidInput("stage timeout must be at least 1 second".into()));
        }
        self.language_pair()?;
        Ok(())
    }

    pub fn language_pair(&self) -> Result<LanguagePair, DubError> {
        LanguagePair::new(self.source_language.clone(), self.target_language.clone())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
