use crate::shared::error::ServiceError;
use crate::shared::language::LanguageCode;

/// Domain interface for machine translation.
///
/// Empty input text must yield empty output text.
pub trait TranslationService: Send + Sync {
    fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<String, ServiceError>;
}
