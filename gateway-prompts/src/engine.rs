//! Prompt construction for a single request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gateway_primitives::TemplateKind;
use tracing::{debug, warn};

use crate::layouts::{PromptParts, render};
use crate::template::TemplateResult;
use crate::translate::{IdentityTranslator, Translator};

/// Default language questions are translated into for the SQL layout.
pub const DEFAULT_PIVOT_LANGUAGE: &str = "en";

const DEFAULT_TRANSLATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds rendered prompts, translating SQL questions on the way.
#[derive(Clone)]
pub struct PromptEngine {
    translator: Arc<dyn Translator>,
    pivot_language: String,
    translation_timeout: Duration,
}

impl fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptEngine")
            .field("pivot_language", &self.pivot_language)
            .field("translation_timeout", &self.translation_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new(Arc::new(IdentityTranslator))
    }
}

impl PromptEngine {
    /// Creates an engine backed by `translator`.
    #[must_use]
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            pivot_language: DEFAULT_PIVOT_LANGUAGE.to_owned(),
            translation_timeout: DEFAULT_TRANSLATION_TIMEOUT,
        }
    }

    /// Replaces the translator, keeping the pivot language and timeout.
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Sets the language SQL questions are translated into.
    #[must_use]
    pub fn with_pivot_language(mut self, language: impl Into<String>) -> Self {
        self.pivot_language = language.into();
        self
    }

    /// Bounds how long a translation may take before the original text is used.
    #[must_use]
    pub fn with_translation_timeout(mut self, timeout: Duration) -> Self {
        self.translation_timeout = timeout;
        self
    }

    /// Returns the configured pivot language.
    #[must_use]
    pub fn pivot_language(&self) -> &str {
        &self.pivot_language
    }

    /// Renders `parts` with the layout for `kind`.
    ///
    /// For [`TemplateKind::Sql`] the question is first translated into the
    /// pivot language. Translation is best effort: on error or timeout the
    /// original question is used.
    ///
    /// # Errors
    ///
    /// Propagates template failures from [`render`].
    pub async fn build(
        &self,
        kind: TemplateKind,
        parts: PromptParts<'_>,
    ) -> TemplateResult<String> {
        if kind != TemplateKind::Sql {
            return render(kind, &parts);
        }

        let translated = self.translate_question(parts.user_question).await;
        let parts = PromptParts {
            user_question: translated.as_deref().unwrap_or(parts.user_question),
            ..parts
        };
        render(kind, &parts)
    }

    async fn translate_question(&self, question: &str) -> Option<String> {
        let call = self.translator.translate(question, &self.pivot_language);
        match tokio::time::timeout(self.translation_timeout, call).await {
            Ok(Ok(text)) => {
                debug!(target_language = %self.pivot_language, "question translated");
                Some(text)
            }
            Ok(Err(err)) => {
                warn!(%err, "translation failed; using original question");
                None
            }
            Err(_) => {
                let timeout_ms =
                    u64::try_from(self.translation_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "translation timed out; using original question");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::translate::TranslationError;

    const PARTS: PromptParts<'static> = PromptParts {
        system_prompt: "Write SQL.",
        data_context: "CREATE TABLE sales(region TEXT, amount INT)",
        user_question: "¿Qué región vendió más?",
    };

    struct Recording {
        calls: Arc<AtomicUsize>,
        outcome: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Translator for Recording {
        async fn translate(
            &self,
            _text: &str,
            target_language: &str,
        ) -> Result<String, TranslationError> {
            assert_eq!(target_language, "en");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .map(str::to_owned)
                .map_err(TranslationError::new)
        }
    }

    struct Stalled;

    #[async_trait]
    impl Translator for Stalled {
        async fn translate(&self, _: &str, _: &str) -> Result<String, TranslationError> {
            std::future::pending().await
        }
    }

    fn engine(outcome: Result<&'static str, &'static str>) -> (PromptEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let translator = Recording {
            calls: Arc::clone(&calls),
            outcome,
        };
        (PromptEngine::new(Arc::new(translator)), calls)
    }

    #[tokio::test]
    async fn sql_question_is_translated() {
        let (engine, calls) = engine(Ok("Which region sold most?"));
        let prompt = engine.build(TemplateKind::Sql, PARTS).await.unwrap();

        assert!(prompt.contains("Which region sold most?"));
        assert!(!prompt.contains(PARTS.user_question));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn translation_failure_keeps_original() {
        let (engine, calls) = engine(Err("service unavailable"));
        let prompt = engine.build(TemplateKind::Sql, PARTS).await.unwrap();

        assert!(prompt.contains(PARTS.user_question));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_layouts_skip_translation() {
        let (engine, calls) = engine(Ok("ignored"));
        let prompt = engine.build(TemplateKind::Contextual, PARTS).await.unwrap();

        assert!(prompt.contains(PARTS.user_question));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_translation_falls_back() {
        let engine = PromptEngine::new(Arc::new(Stalled))
            .with_translation_timeout(Duration::from_millis(100));
        let prompt = engine.build(TemplateKind::Sql, PARTS).await.unwrap();
        assert!(prompt.contains(PARTS.user_question));
    }

    #[tokio::test(start_paused = true)]
    async fn swapping_translator_keeps_settings() {
        let engine = PromptEngine::default()
            .with_translation_timeout(Duration::from_millis(100))
            .with_pivot_language("de")
            .with_translator(Arc::new(Stalled));

        assert_eq!(engine.pivot_language(), "de");
        let prompt = engine.build(TemplateKind::Sql, PARTS).await.unwrap();
        assert!(prompt.contains(PARTS.user_question));
    }

    #[test]
    fn default_pivot_is_english() {
        assert_eq!(PromptEngine::default().pivot_language(), "en");
    }
}
