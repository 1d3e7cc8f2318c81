//! Query text normalization.

use std::sync::OnceLock;

use regex::Regex;

/// Regex matching every character that is neither a word character nor
/// whitespace. Compiled once per process.
fn non_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s]").expect("static pattern is valid"))
}

/// Normalize a piece of query text.
///
/// Lower-cases all characters and removes everything that is not
/// alphanumeric or whitespace. Whitespace runs are preserved. The function
/// is pure and idempotent, and is applied identically when building the
/// training corpus and when routing a live query.
///
/// # Examples
///
/// ```
/// use lodestar::analysis::normalize;
///
/// assert_eq!(normalize("What's my Purpose?"), "whats my purpose");
/// assert_eq!(normalize("already clean"), "already clean");
/// ```
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    non_word_pattern().replace_all(&lowered, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalize("I'm anxious about my exam results."),
            "im anxious about my exam results"
        );
        assert_eq!(normalize("Hello, World!"), "hello world");
    }

    #[test]
    fn test_preserves_whitespace_runs() {
        assert_eq!(normalize("a  b\tc"), "a  b\tc");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "What should I do?!",
            "  spaced   out  ",
            "MIXED case Text, with; punctuation...",
            "",
            "数字と文字123",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_keeps_unicode_alphanumerics() {
        assert_eq!(normalize("Café №5"), "café 5");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("?!..."), "");
    }
}
