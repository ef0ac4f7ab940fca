/// Keep the first `max_words` whitespace-separated words of `text`.
///
/// Any run of Unicode whitespace counts as one separator and the kept words are
/// joined with single spaces.
pub fn summarize(text: &str, max_words: usize) -> String {
    text.split_whitespace().take(max_words).collect::<Vec<_>>().join(" ")
}
