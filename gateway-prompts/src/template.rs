//! Prompt templates with `{{variable}}` substitution.

use std::collections::HashMap;
use std::fmt;

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A required variable was not provided.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// Template rendering failed.
    #[error("template rendering failed: {reason}")]
    RenderError {
        /// Reason for the failure.
        reason: String,
    },
}

/// A prompt template with variable substitution.
///
/// Placeholders use `{{name}}` syntax. Substitution is single pass, so values
/// that themselves contain `{{...}}` are inserted verbatim and never expanded.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use gateway_prompts::template::PromptTemplate;
///
/// let template = PromptTemplate::new("You are {{role}}. {{task}}").require("role");
///
/// let mut vars = HashMap::new();
/// vars.insert("role", "a data analyst");
/// let rendered = template.render(&vars).unwrap();
/// assert_eq!(rendered, "You are a data analyst. ");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
    required: Vec<String>,
}

impl PromptTemplate {
    /// Creates a template from the supplied text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            required: Vec::new(),
        }
    }

    /// Declares a variable that must be supplied at render time.
    #[must_use]
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the names of the placeholders in order of appearance.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else { break };
            names.push(after[..end].trim());
            rest = &after[end + 2..];
        }
        names
    }

    /// Renders the template.
    ///
    /// Optional variables that are not supplied render as an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a required variable is not
    /// supplied, or [`TemplateError::RenderError`] on an unterminated placeholder.
    pub fn render(&self, vars: &HashMap<&str, &str>) -> TemplateResult<String> {
        for name in &self.required {
            if !vars.contains_key(name.as_str()) {
                return Err(TemplateError::MissingVariable { name: name.clone() });
            }
        }

        let extra: usize = vars.values().map(|value| value.len()).sum();
        let mut out = String::with_capacity(self.text.len() + extra);
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| TemplateError::RenderError {
                reason: format!("unterminated placeholder at `{}`", truncate(&rest[start..])),
            })?;
            let name = after[..end].trim();
            out.push_str(vars.get(name).copied().unwrap_or_default());
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(out)
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(24) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn renders_multiple_variables() {
        let template = PromptTemplate::new("{{greeting}} {{name}}, {{question}}");
        let rendered = template
            .render(&vars(&[
                ("greeting", "Hello"),
                ("name", "Alice"),
                ("question", "how are you?"),
            ]))
            .unwrap();
        assert_eq!(rendered, "Hello Alice, how are you?");
    }

    #[test]
    fn required_variables_error_when_missing() {
        let template = PromptTemplate::new("Hello {{name}}!").require("name");
        let err = template.render(&HashMap::new()).expect_err("should error");
        assert!(matches!(err, TemplateError::MissingVariable { name } if name == "name"));
    }

    #[test]
    fn optional_variables_render_empty() {
        let template = PromptTemplate::new("[{{ missing }}]");
        assert_eq!(template.render(&HashMap::new()).unwrap(), "[]");
    }

    #[test]
    fn values_are_not_expanded_again() {
        let template = PromptTemplate::new("Q: {{question}} / {{answer}}");
        let rendered = template
            .render(&vars(&[("question", "what is {{answer}}?"), ("answer", "42")]))
            .unwrap();
        assert_eq!(rendered, "Q: what is {{answer}}? / 42");
    }

    #[test]
    fn unterminated_placeholder_is_render_error() {
        let template = PromptTemplate::new("Hello {{name");
        let err = template.render(&HashMap::new()).expect_err("unterminated");
        assert!(matches!(err, TemplateError::RenderError { .. }));
    }

    #[test]
    fn lists_variables_in_order() {
        let template = PromptTemplate::new("{{a}} and {{ b }} then {{a}}");
        assert_eq!(template.variables(), vec!["a", "b", "a"]);
    }
}
