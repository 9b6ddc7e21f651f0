//! Citation rendering for finished responses.
//!
//! Only results that name a source file are cited. Numbering starts at 1 and
//! is contiguous over the cited subset; the `context://N` link of each line
//! points at the N-th entry of [`Citations::context`].

use super::ResultInfo;
use std::fmt::Write;

/// Rendered citations for one response (Value Object)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citations {
    /// Reference block appended below the response. Empty when nothing
    /// was cited.
    pub references: String,
    /// Retrieved text of each cited result, in citation order.
    pub context: Vec<String>,
}

impl Citations {
    /// Build the citations for `response` from the captured `results`.
    pub fn build(response: &str, results: &[ResultInfo]) -> Self {
        let mut lines = Vec::new();
        let mut context = Vec::new();

        for (index, info) in results.iter().filter(|r| !r.file.is_empty()).enumerate() {
            let number = index + 1;
            if number == 1 {
                let lead = if response.ends_with('\n') { "" } else { "\n" };
                lines.push(format!("{lead}\n---"));
            }
            lines.push(format_reference(number, info));
            context.push(info.text.clone());
        }

        Self {
            references: lines.join("\n"),
            context,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

fn format_reference(number: usize, info: &ResultInfo) -> String {
    let mut line = format!("{number}. ");
    if !info.title.is_empty() {
        let _ = write!(line, "\"{}\". ", info.title);
    }
    if !info.author.is_empty() {
        let _ = write!(line, "By {}. ", info.author);
    }
    if !info.date.is_empty() {
        let _ = write!(line, "Date: {}. ", info.date);
    }
    let _ = write!(line, "In {}. ", info.file);
    if let Some(page) = info.page {
        let _ = write!(line, "Page {page}. ");
    }
    if let Some(from) = info.from {
        let _ = write!(line, "Lines {from}");
        if let Some(to) = info.to {
            let _ = write!(line, "-{to}");
        }
        line.push_str(". ");
    }
    let _ = write!(line, "[Context](context://{number})");
    line
}
