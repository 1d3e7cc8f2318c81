//! Word n-gram extraction.

/// Generate contiguous word n-grams from whitespace-separated text.
///
/// Produces every n-gram with `min_n <= n <= max_n`, in document order,
/// shorter sizes first at each starting position. Words inside an n-gram
/// are joined by a single space regardless of the original whitespace run.
///
/// # Examples
///
/// ```
/// use lodestar::analysis::word_ngrams;
///
/// assert_eq!(
///     word_ngrams("a b c", 1, 2),
///     vec!["a", "a b", "b", "b c", "c"]
/// );
/// assert_eq!(word_ngrams("solo", 1, 2), vec!["solo"]);
/// assert_eq!(word_ngrams("", 1, 2), Vec::<String>::new());
/// ```
pub fn word_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    debug_assert!(min_n >= 1 && max_n >= min_n);

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut ngrams = Vec::new();

    for start in 0..words.len() {
        for n in min_n..=max_n {
            let end = start + n;
            if end > words.len() {
                break;
            }
            ngrams.push(words[start..end].join(" "));
        }
    }

    ngrams
}
