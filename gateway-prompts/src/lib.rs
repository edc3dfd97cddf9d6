//! Prompt construction for the inference gateway.
//!
//! [`layouts`] holds the fixed prompt layouts and the rule that picks one per
//! backend. [`PromptEngine`] renders a request with the chosen layout and runs
//! SQL questions through a [`Translator`] first.

#![warn(missing_docs, clippy::pedantic)]

pub mod engine;
pub mod layouts;
pub mod template;
pub mod translate;

pub use engine::{DEFAULT_PIVOT_LANGUAGE, PromptEngine};
pub use layouts::{PromptParts, render, select_template};
pub use template::{PromptTemplate, TemplateError, TemplateResult};
pub use translate::{IdentityTranslator, TranslationError, Translator};
