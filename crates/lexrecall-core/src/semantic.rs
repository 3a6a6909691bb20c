//! Embedding-similarity ranking against a snapshot's embedding matrix.
//!
//! Scoring itself is synchronous; embedding the query is the router's job
//! so the network wait can be bounded by a timeout.

use crate::embedding::cosine_similarity;
use crate::index::Snapshot;
use crate::models::{Hit, Retrieved, Strategy};

/// Default minimum cosine for a semantic candidate.
pub const DEFAULT_SEMANTIC_FLOOR: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SemanticScorer {
    floor: f64,
}

impl Default for SemanticScorer {
    fn default() -> Self {
        Self::new(DEFAULT_SEMANTIC_FLOOR)
    }
}

impl SemanticScorer {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    /// Rank documents by cosine to `query_vec`, keeping those at or above
    /// the floor. A snapshot without embeddings yields no results.
    pub fn score(&self, snapshot: &Snapshot, query_vec: &[f32], k: usize) -> Retrieved {
        let Some(matrix) = snapshot.embeddings() else {
            return Retrieved::NoMatch;
        };
        if k == 0 || query_vec.is_empty() {
            return Retrieved::NoMatch;
        }

        let mut ranked: Vec<(usize, f64)> = matrix
            .iter()
            .enumerate()
            .map(|(i, row)| (i, f64::from(cosine_similarity(query_vec, row))))
            .filter(|(_, sim)| *sim >= self.floor)
            .collect();

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        let docs = snapshot.documents();
        let hits = ranked
            .into_iter()
            .map(|(i, sim)| Hit::from_document(&docs[i].doc, sim.clamp(0.0, 1.0)))
            .collect();
        Retrieved::from_hits(Strategy::Semantic, hits)
    }
}
