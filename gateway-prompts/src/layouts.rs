//! Fixed prompt layouts and the policy that picks one per backend.

use std::collections::HashMap;

use gateway_primitives::TemplateKind;

use crate::template::{PromptTemplate, TemplateResult};

const SYSTEM_PROMPT: &str = "system_prompt";
const DATA_CONTEXT: &str = "data_context";
const USER_QUESTION: &str = "user_question";

const CONTEXTUAL: &str = "{{system_prompt}}

Context:
{{data_context}}

Question: {{user_question}}
Answer:";

const LLAMA_INSTRUCT: &str = "<s>[INST] <<SYS>>
{{system_prompt}}
<</SYS>>

Context:
{{data_context}}

{{user_question}} [/INST]";

const CHAT_ML: &str = "<|im_start|>system
{{system_prompt}}<|im_end|>
<|im_start|>user
Context:
{{data_context}}

{{user_question}}<|im_end|>
<|im_start|>assistant
";

const SQL: &str = "{{system_prompt}}

### Schema
{{data_context}}

### Question
{{user_question}}

### SQL query
";

/// The three pieces every layout is filled with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptParts<'a> {
    /// Instructions framing the task.
    pub system_prompt: &'a str,
    /// Dataset excerpt or schema the question refers to.
    pub data_context: &'a str,
    /// The caller's question.
    pub user_question: &'a str,
}

/// Picks a layout from a backend name.
///
/// Matching is a case-insensitive substring test; anything unrecognised gets
/// [`TemplateKind::Contextual`].
#[must_use]
pub fn select_template(backend_name: &str) -> TemplateKind {
    let name = backend_name.to_ascii_lowercase();
    if name.contains("sql") {
        TemplateKind::Sql
    } else if name.contains("llama") || name.contains("mistral") {
        TemplateKind::LlamaInstruct
    } else if name.contains("qwen") || name.contains("chatml") {
        TemplateKind::ChatMl
    } else {
        TemplateKind::Contextual
    }
}

/// Returns the template backing `kind`.
#[must_use]
pub fn template_for(kind: TemplateKind) -> PromptTemplate {
    let text = match kind {
        TemplateKind::Contextual => CONTEXTUAL,
        TemplateKind::LlamaInstruct => LLAMA_INSTRUCT,
        TemplateKind::ChatMl => CHAT_ML,
        TemplateKind::Sql => SQL,
    };
    PromptTemplate::new(text)
        .require(SYSTEM_PROMPT)
        .require(DATA_CONTEXT)
        .require(USER_QUESTION)
}

/// Fills the layout for `kind` with `parts`.
///
/// Deterministic: the same inputs always produce the same prompt.
///
/// # Errors
///
/// Propagates [`TemplateError`](crate::template::TemplateError) from the
/// template, which the built-in layouts never produce.
pub fn render(kind: TemplateKind, parts: &PromptParts<'_>) -> TemplateResult<String> {
    let vars = HashMap::from([
        (SYSTEM_PROMPT, parts.system_prompt),
        (DATA_CONTEXT, parts.data_context),
        (USER_QUESTION, parts.user_question),
    ]);
    template_for(kind).render(&vars)
}
