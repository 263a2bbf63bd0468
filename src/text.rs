//! Shared tokenization for the similarity (C7) and topic (C8) engines —
//! both need the same lowercase/strip-diacritics/stop-word-filtered token
//! stream, so it lives in one place rather than twice.

use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Tokenizes `text` into lowercase, diacritic-stripped, stop-word-filtered
/// word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    folded
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

/// A minimal English stop-word list. Not exhaustive by design — the
/// vectorizer's document-frequency cap does the heavy lifting; this list
/// only removes function words common enough to blow out every vector.
pub static STOP_WORDS: once_cell::sync::Lazy<HashSet<&'static str>> = once_cell::sync::Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "if", "then", "else", "of", "to", "in", "on", "at",
        "by", "for", "with", "about", "against", "between", "into", "through", "during", "before",
        "after", "above", "below", "from", "up", "down", "out", "off", "over", "under", "again",
        "further", "is", "am", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "shall", "should", "can", "could", "may", "might",
        "must", "it", "its", "this", "that", "these", "those", "i", "you", "he", "she", "we",
        "they", "me", "him", "her", "us", "them", "my", "your", "his", "our", "their", "as", "so",
        "not", "no", "nor", "too", "very", "just", "also", "there", "here", "what", "which",
        "who", "whom", "how", "why", "when", "where", "all", "any", "both", "each", "few", "more",
        "most", "other", "some", "such", "only", "own", "same", "than",
    ]
    .into_iter()
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_strips_stop_words() {
        let tokens = tokenize("The Quick Brown Fox jumps over the lazy dog");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"quick".to_string()));
        assert!(tokens.contains(&"jumps".to_string()));
    }

    #[test]
    fn tokenize_folds_diacritics() {
        let tokens = tokenize("café naïve");
        assert!(tokens.contains(&"cafe".to_string()));
        assert!(tokens.contains(&"naive".to_string()));
    }

    #[test]
    fn tokenize_drops_single_characters() {
        let tokens = tokenize("a b cat");
        assert_eq!(tokens, vec!["cat".to_string()]);
    }
}
