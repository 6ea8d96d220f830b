//! Guard rails applied to user input before it reaches the transcript.

use regex::Regex;

use crate::error::Rejection;

lazy_static::lazy_static! {
    // Script tags, javascript: URIs and inline event handlers such as onclick=.
    static ref UNSAFE_MARKUP: Regex = Regex::new(
        r"(?i)<\s*/?\s*script\b|javascript\s*:|\bon[a-z]+\s*="
    )
    .expect("unsafe markup pattern is valid");
}

/// Returns true when the text carries markup that could execute once rendered.
pub fn contains_unsafe_markup(text: &str) -> bool {
    UNSAFE_MARKUP.is_match(text)
}

/// Check a submission against the empty, length and markup rules.
/// Length is counted in characters, not bytes.
pub fn validate_input(text: &str, max_chars: usize) -> Result<(), Rejection> {
    if text.trim().is_empty() {
        return Err(Rejection::Empty);
    }
    if text.chars().count() > max_chars {
        return Err(Rejection::TooLong { max: max_chars });
    }
    if contains_unsafe_markup(text) {
        return Err(Rejection::Unsafe);
    }
    Ok(())
}
