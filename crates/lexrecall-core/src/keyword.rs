//! Substring keyword fallback, used before the first index build or when
//! `keyword` mode is requested explicitly.

use std::collections::BTreeSet;

use crate::models::{Document, Hit, Retrieved, Strategy};

/// Score one document: the fraction of distinct query tokens that occur as
/// substrings of its normalized search text.
pub fn keyword_score(query_tokens: &BTreeSet<&str>, search_text: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let found = query_tokens
        .iter()
        .filter(|t| search_text.contains(**t))
        .count();
    found as f64 / query_tokens.len() as f64
}

/// Rank `(document, search_text)` pairs by [`keyword_score`], dropping
/// zero scores. Ties keep input order.
pub fn keyword_search<'a, I>(query_tokens: &[String], docs: I, k: usize) -> Retrieved
where
    I: IntoIterator<Item = (&'a Document, &'a str)>,
{
    let query: BTreeSet<&str> = query_tokens.iter().map(String::as_str).collect();
    if query.is_empty() || k == 0 {
        return Retrieved::NoMatch;
    }

    let mut scored: Vec<(&Document, f64)> = docs
        .into_iter()
        .map(|(doc, text)| (doc, keyword_score(&query, text)))
        .filter(|(_, score)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    let hits = scored
        .into_iter()
        .map(|(doc, score)| Hit::from_document(doc, score))
        .collect();
    Retrieved::from_hits(Strategy::Keyword, hits)
}
