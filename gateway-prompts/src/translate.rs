//! Translation collaborator used by the SQL layout.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a [`Translator`].
#[derive(Debug, Error)]
#[error("translation failed: {reason}")]
pub struct TranslationError {
    reason: String,
}

impl TranslationError {
    /// Creates an error with the supplied reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Translates free text into a target language.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` into `target_language` (an ISO 639-1 code such as `en`).
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError`] when the text cannot be translated.
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError>;
}

/// Translator that returns its input untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(
        &self,
        text: &str,
        _target_language: &str,
    ) -> Result<String, TranslationError> {
        Ok(text.to_owned())
    }
}
