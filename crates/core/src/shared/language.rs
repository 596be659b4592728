use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DubError;

/// A language tag such as `en`, `en-US` or `hi-IN`.
///
/// The full tag is handed to speech recognition; translation and synthesis
/// engines only understand the primary subtag (see [`LanguageCode::primary`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(tag: &str) -> Result<Self, DubError> {
        let tag = tag.trim();
        let mut parts = tag.split(['-', '_']);
        let primary = parts.next().unwrap_or_default();
        if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DubError::InvalidInput(format!(
                "invalid language code '{tag}'"
            )));
        }

        let mut normalized = primary.to_ascii_lowercase();
        for region in parts {
            if region.is_empty()
                || region.len() > 8
                || !region.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(DubError::InvalidInput(format!(
                    "invalid language code '{tag}'"
                )));
            }
            normalized.push('-');
            if region.len() == 2 {
                normalized.push_str(&region.to_ascii_uppercase());
            } else {
                normalized.push_str(region);
            }
        }
        Ok(Self(normalized))
    }

    /// For compile-time constants that are already normalized.
    pub(crate) fn from_static(tag: &'static str) -> Self {
        debug_assert!(Self::new(tag).is_ok_and(|c| c.0 == tag));
        Self(tag.to_string())
    }

    /// Full normalized tag, e.g. `en-US`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag, e.g. `en` for `en-US`.
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageCode {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = DubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

/// Source and target language of one dubbing run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: LanguageCode,
    pub target: LanguageCode,
}

impl LanguagePair {
    pub fn new(source: LanguageCode, target: LanguageCode) -> Result<Self, DubError> {
        if source.primary() == target.primary() {
            return Err(DubError::InvalidInput(format!(
                "source and target language are both '{}'",
                source.primary()
            )));
        }
        Ok(Self { source, target })
    }
}
