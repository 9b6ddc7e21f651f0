//! Display names derived from model-generated titles.

/// Maximum number of words kept from a generated title.
pub const MAX_NAME_WORDS: usize = 3;

/// Derive a session display name from a model-generated title.
///
/// Keeps at most the first three whitespace-delimited words; runs of
/// whitespace (including newlines) collapse and empty tokens are dropped.
pub fn derive_display_name(generated: &str) -> String {
    generated
        .split_whitespace()
        .take(MAX_NAME_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}
