//! Response Normalizer - Artifact stripping and sentence completion
//!
//! Every step only removes or finalizes text that is already there.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Returned when the model produced nothing usable
pub const COULD_NOT_GENERATE: &str =
    "A comprehensive response could not be generated based on the available sources.";

const TERMINALS: [char; 3] = ['.', '!', '?'];

/// Final answer plus what normalization did to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAnswer {
    pub text: String,

    /// A trailing incomplete sentence was dropped or a period appended
    pub truncated: bool,

    /// Source markers were removed
    pub artifacts_stripped: bool,
}

impl NormalizedAnswer {
    fn degenerate() -> Self {
        Self {
            text: COULD_NOT_GENERATE.to_string(),
            truncated: false,
            artifacts_stripped: false,
        }
    }
}

/// Marker patterns, applied in order. Parenthesized first so its brackets go with it.
fn marker_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"[ \t]*\(Source\s*[0-9]+\)",
            r"[ \t]*\[?Source\s*[0-9]+\]?",
            r"MEDICAL_SOURCE_[0-9]+:[ \t]*",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("marker pattern is valid"))
        .collect()
    })
}

/// Normalize raw generated text into the final answer
pub fn normalize(raw: &str) -> NormalizedAnswer {
    if raw.trim().is_empty() {
        return NormalizedAnswer::degenerate();
    }

    let (stripped, artifacts_stripped) = strip_markers(raw);
    let text = stripped.trim();
    // Leftover punctuation alone is not an answer
    if !text.chars().any(char::is_alphanumeric) {
        return NormalizedAnswer {
            artifacts_stripped,
            ..NormalizedAnswer::degenerate()
        };
    }

    let (text, truncated) = complete_sentences(text);
    NormalizedAnswer {
        text,
        truncated,
        artifacts_stripped,
    }
}

fn strip_markers(raw: &str) -> (String, bool) {
    let mut text = raw.to_string();
    let mut stripped = false;

    for pattern in marker_patterns() {
        if pattern.is_match(&text) {
            text = pattern.replace_all(&text, "").into_owned();
            stripped = true;
        }
    }

    (text, stripped)
}

/// Ensure `text` (already trimmed, non-empty) ends in terminal punctuation
fn complete_sentences(text: &str) -> (String, bool) {
    if text.ends_with(TERMINALS) {
        return (text.to_string(), false);
    }

    match last_sentence_end(text) {
        // Drop the trailing fragment
        Some(end) => (text[..end].to_string(), true),
        None => (format!("{}.", text), true),
    }
}

/// Byte offset just past the last terminal mark that is followed by whitespace
fn last_sentence_end(text: &str) -> Option<usize> {
    let mut end = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if TERMINALS.contains(&c) && matches!(chars.peek(), Some((_, next)) if next.is_whitespace()) {
            end = Some(idx + c.len_utf8());
        }
    }

    end
}
