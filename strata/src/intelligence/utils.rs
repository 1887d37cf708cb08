use std::sync::LazyLock;

use regex::Regex;

/// Leading category tag such as `[FACT]` or `[PREFERENCE]`.
static CATEGORY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([A-Za-z_][A-Za-z0-9_ -]*)\]\s*").unwrap());

/// Remove a leading category tag. Text without one is returned trimmed.
pub fn strip_category_prefix(content: &str) -> &str {
    match CATEGORY_PREFIX.find(content) {
        Some(m) => content[m.end()..].trim(),
        None => content.trim(),
    }
}

/// The category tag of `content`, upper-cased, if it has one.
pub fn category_prefix(content: &str) -> Option<String> {
    CATEGORY_PREFIX
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_uppercase())
}

/// Cosine similarity in `[-1, 1]`. Mismatched or zero-length vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Whether `word` occurs in `text` as a whole word (ASCII case-insensitive).
pub fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .any(|token| token.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_category_prefix() {
        assert_eq!(strip_category_prefix("[FACT] User likes tea"), "User likes tea");
        assert_eq!(strip_category_prefix("  [personal info]  Lives in Oslo "), "Lives in Oslo");
        assert_eq!(strip_category_prefix("User likes tea"), "User likes tea");
        assert_eq!(strip_category_prefix("[1] not a tag"), "[1] not a tag");
    }

    #[test]
    fn test_category_prefix() {
        assert_eq!(category_prefix("[fact] x").as_deref(), Some("FACT"));
        assert_eq!(category_prefix("x"), None);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_contains_word_respects_boundaries() {
        assert!(contains_word("User is Single now", "single"));
        assert!(!contains_word("User is unmarried", "married"));
        assert!(contains_word("self-employed since May", "self-employed"));
        assert!(!contains_word("self-employed since May", "employed"));
    }
}
