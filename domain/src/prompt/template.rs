//! Prompt templates and context augmentation

use crate::retrieval::ResultInfo;

/// Placeholder substituted with the user's prompt.
pub const PROMPT_PLACEHOLDER: &str = "%1";

/// Header line introducing retrieved context.
pub const CONTEXT_HEADER: &str = "### Context:";

/// Templates used when talking to the worker
pub struct PromptTemplate;

impl PromptTemplate {
    /// Default instruction template.
    pub fn default_template() -> &'static str {
        "### Human:\n%1\n### Assistant:\n"
    }

    /// Prompt asking the model for a short session title.
    pub fn name_request() -> &'static str {
        "Describe response above in three words."
    }

    /// Substitute `prompt` into every placeholder of `template`.
    ///
    /// A template without a placeholder gets the prompt appended.
    pub fn render(template: &str, prompt: &str) -> String {
        if template.contains(PROMPT_PLACEHOLDER) {
            template.replace(PROMPT_PLACEHOLDER, prompt)
        } else {
            format!("{template}{prompt}")
        }
    }

    /// Prepend retrieved context to `template`.
    ///
    /// With results the output is the context header, each result's text,
    /// then the original template, one per line. Without results the
    /// template is returned unchanged.
    pub fn augment_with_context(template: &str, results: &[ResultInfo]) -> String {
        let mut lines: Vec<&str> = Vec::with_capacity(results.len() + 2);
        if !results.is_empty() {
            lines.push(CONTEXT_HEADER);
        }
        lines.extend(results.iter().map(|r| r.text.as_str()));
        lines.push(template);
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str) -> ResultInfo {
        ResultInfo {
            file: "a.txt".to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn render_substitutes_placeholder() {
        let rendered = PromptTemplate::render(PromptTemplate::default_template(), "What is X?");
        assert_eq!(rendered, "### Human:\nWhat is X?\n### Assistant:\n");
    }

    #[test]
    fn render_without_placeholder_appends() {
        assert_eq!(PromptTemplate::render("Q: ", "hi"), "Q: hi");
    }

    #[test]
    fn augment_without_results_is_identity() {
        let template = PromptTemplate::default_template();
        assert_eq!(PromptTemplate::augment_with_context(template, &[]), template);
    }

    #[test]
    fn augment_prepends_header_and_texts() {
        let augmented = PromptTemplate::augment_with_context(
            "%1",
            &[result("X is Y."), result("Y is Z.")],
        );
        assert_eq!(augmented, "### Context:\nX is Y.\nY is Z.\n%1");
    }
}
