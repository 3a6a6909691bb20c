//! TF-IDF + keyword-overlap ranking.
//!
//! # Scoring
//!
//! ```text
//! score = w_tfidf × (cos / max_cos) + w_kw × |Q ∩ D| / |Q|
//! ```
//!
//! `cos` is the cosine between the query and document TF-IDF rows;
//! dividing by the best cosine in the candidate set maps the top candidate
//! to 1.0. `Q` is the deduplicated query token set and `D` the document's
//! token set. Documents with no TF-IDF overlap are not candidates.
//! Ties keep corpus order.

use std::collections::HashSet;

use crate::index::{sparse_dot, Snapshot};
use crate::models::{Hit, Retrieved, Strategy};

/// Blend weights for the lexical score. Scores stay in `[0, 1]` while the
/// weights sum to at most 1.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalParams {
    pub tfidf_weight: f64,
    pub keyword_weight: f64,
}

impl Default for LexicalParams {
    fn default() -> Self {
        Self {
            tfidf_weight: 0.7,
            keyword_weight: 0.3,
        }
    }
}

/// Fraction of distinct query tokens present in `doc_tokens`.
pub fn keyword_match_fraction(query_tokens: &HashSet<&str>, doc_tokens: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens
        .iter()
        .filter(|t| doc_tokens.contains(**t))
        .count();
    matched as f64 / query_tokens.len() as f64
}

#[derive(Debug, Clone, Default)]
pub struct LexicalScorer {
    params: LexicalParams,
}

impl LexicalScorer {
    pub fn new(params: LexicalParams) -> Self {
        Self { params }
    }

    /// Rank the snapshot against a query.
    ///
    /// `query_tokens` drive the keyword fraction; `expanded_tokens` (the
    /// query plus any synonym expansion) build the TF-IDF query vector.
    pub fn score(
        &self,
        snapshot: &Snapshot,
        query_tokens: &[String],
        expanded_tokens: &[String],
        k: usize,
    ) -> Retrieved {
        if k == 0 || snapshot.is_empty() {
            return Retrieved::NoMatch;
        }

        let query_vec = snapshot.tfidf().transform(expanded_tokens);
        if query_vec.is_empty() {
            return Retrieved::NoMatch;
        }

        let cosines: Vec<(usize, f64)> = snapshot
            .tfidf()
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| (i, sparse_dot(row, &query_vec)))
            .filter(|(_, c)| *c > 0.0)
            .collect();

        let max_cos = cosines.iter().map(|(_, c)| *c).fold(0.0, f64::max);
        if max_cos <= 0.0 {
            return Retrieved::NoMatch;
        }

        let query_set: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
        let docs = snapshot.documents();

        let mut ranked: Vec<(usize, f64)> = cosines
            .into_iter()
            .map(|(i, c)| {
                let kw = keyword_match_fraction(&query_set, &docs[i].tokens);
                let score =
                    self.params.tfidf_weight * (c / max_cos) + self.params.keyword_weight * kw;
                (i, score)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(k);

        let hits = ranked
            .into_iter()
            .map(|(i, score)| Hit::from_document(&docs[i].doc, score))
            .collect();
        Retrieved::from_hits(Strategy::Lexical, hits)
    }
}
