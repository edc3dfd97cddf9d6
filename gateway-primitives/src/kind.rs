//! Tags describing how a tool is served.
//!
//! These are decided once when the catalog is loaded and never re-parsed from
//! display names on the request path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Mechanism backing a tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Network call to an external inference provider.
    RemoteApi,
    /// In-process classification model.
    LocalClassifier,
    /// In-process detection model.
    LocalDetector,
    /// In-process clustering model.
    LocalClusterer,
    /// In-process language model.
    LocalLlm,
}

impl BackendKind {
    /// Returns `true` for every in-process variant.
    #[must_use]
    pub const fn is_local(self) -> bool {
        !matches!(self, Self::RemoteApi)
    }

    /// Stable snake-case label used in logs and records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteApi => "remote_api",
            Self::LocalClassifier => "local_classifier",
            Self::LocalDetector => "local_detector",
            Self::LocalClusterer => "local_clusterer",
            Self::LocalLlm => "local_llm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote_api" | "remote" | "api" => Ok(Self::RemoteApi),
            "local_classifier" | "classifier" => Ok(Self::LocalClassifier),
            "local_detector" | "detector" => Ok(Self::LocalDetector),
            "local_clusterer" | "clusterer" => Ok(Self::LocalClusterer),
            "local_llm" | "llm" => Ok(Self::LocalLlm),
            _ => Err(Error::UnknownTag {
                what: "backend kind",
                value: s.to_owned(),
            }),
        }
    }
}

/// Provider family used by [`BackendKind::RemoteApi`] tools.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProvider {
    /// `OpenAI`-compatible chat completions.
    #[default]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Ollama daemon chat API.
    Ollama,
}

impl RemoteProvider {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for RemoteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named prompt layouts understood by the template engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Plain contextual layout: system prompt, data context, question.
    #[default]
    Contextual,
    /// `[INST]`-style layout used by Llama and Mistral instruction models.
    LlamaInstruct,
    /// `<|im_start|>` chat markup.
    ChatMl,
    /// Text-to-SQL layout; the question is translated to the pivot language first.
    Sql,
}

impl TemplateKind {
    /// Stable snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contextual => "contextual",
            Self::LlamaInstruct => "llama_instruct",
            Self::ChatMl => "chat_ml",
            Self::Sql => "sql",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_aliases() {
        assert_eq!("remote_api".parse::<BackendKind>().unwrap(), BackendKind::RemoteApi);
        assert_eq!(" LLM ".parse::<BackendKind>().unwrap(), BackendKind::LocalLlm);
        assert!("quantum".parse::<BackendKind>().is_err());
    }

    #[test]
    fn local_variants_are_local() {
        assert!(!BackendKind::RemoteApi.is_local());
        assert!(BackendKind::LocalDetector.is_local());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&BackendKind::LocalClusterer).unwrap();
        assert_eq!(json, "\"local_clusterer\"");
        let provider: RemoteProvider = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(provider, RemoteProvider::Anthropic);
    }
}
