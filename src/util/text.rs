//! テキスト照合ユーティリティ。
//!
//! 照合はすべて小文字化した上での部分一致で行う。

/// Lowercases and trims a term, returning `None` for blank input.
#[must_use]
pub fn normalize_term(term: &str) -> Option<String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Case-insensitive substring test. `needle` may be in any case.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Returns the first `max_chars` characters of `text`, lowercased.
///
/// Works on chars rather than bytes so multi-byte prefixes such as "Ü" never
/// split a code point.
#[must_use]
pub fn lowercase_prefix(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().to_lowercase()
}

/// Number of Unicode scalar values in `text`.
#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
