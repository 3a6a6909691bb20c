//! Query normalization contract.
//!
//! Tokens are opaque to the engine: scoring only compares them for
//! equality. Vietnamese word segmentation or diacritic folding belongs in a
//! custom [`QueryNormalizer`]; [`SimpleNormalizer`] is the default.

use std::collections::{BTreeSet, HashSet};

/// Turns free text into an ordered token sequence.
pub trait QueryNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> Vec<String>;
}

/// Common Vietnamese function words and pronouns.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "các", "và", "hay", "là", "được", "để", "trong", "ở", "về", "từ", "với", "như", "cái", "gì",
    "ai", "không", "có", "bạn", "tôi", "mình",
];

/// Lowercases, replaces non-alphanumeric characters with spaces, splits on
/// whitespace, and drops stop words and short tokens.
#[derive(Debug, Clone)]
pub struct SimpleNormalizer {
    stop_words: HashSet<String>,
    min_token_chars: usize,
}

impl SimpleNormalizer {
    pub fn new<I, S>(stop_words: I, min_token_chars: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
            min_token_chars: min_token_chars.max(1),
        }
    }

    /// No stop words, every token kept.
    pub fn plain() -> Self {
        Self::new(Vec::<String>::new(), 1)
    }
}

impl Default for SimpleNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_WORDS.iter().copied(), 1)
    }
}

impl QueryNormalizer for SimpleNormalizer {
    fn normalize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        cleaned
            .split_whitespace()
            .filter(|t| t.chars().count() >= self.min_token_chars)
            .filter(|t| !self.stop_words.contains(*t))
            .map(str::to_string)
            .collect()
    }
}

/// Deduplicated, sorted token list.
pub fn token_list(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Canonical signature for a token sequence: sorted unique tokens joined by
/// a single space. Two queries share a signature iff they have the same
/// token set.
pub fn signature(tokens: &[String]) -> String {
    token_list(tokens).join(" ")
}
