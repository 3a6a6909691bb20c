//! Storage abstractions for the engine.
//!
//! The engine reads documents through a [`DocumentSource`] and keeps its
//! learning state in a [`LearningStore`]. Both are async (via
//! `async-trait`) so that the SQLite backend and the in-memory one share
//! the same call sites.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, Interaction, Pattern, RatingEntry, SynonymPair};

/// Read-only access to the document corpus.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// All documents, in corpus order.
    async fn list_documents(&self) -> Result<Vec<Document>>;
}

/// Everything one feedback submission changes, persisted as a unit.
#[derive(Debug, Clone)]
pub struct FeedbackUpdate {
    /// The interaction after the rating was applied (history included).
    pub interaction: Interaction,
    /// The history entry appended by this submission.
    pub entry: RatingEntry,
    /// Pattern to upsert when the interaction is promoted.
    pub promote: Option<Pattern>,
}

/// Persistence for interactions, patterns, and synonym pairs.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_interaction`](LearningStore::insert_interaction) | Store a new interaction |
/// | [`get_interaction`](LearningStore::get_interaction) | Fetch one interaction with its rating history |
/// | [`list_interactions`](LearningStore::list_interactions) | All interactions, oldest first |
/// | [`record_feedback`](LearningStore::record_feedback) | Atomically apply a [`FeedbackUpdate`] |
/// | [`get_pattern`](LearningStore::get_pattern) | Fetch a pattern by signature |
/// | [`list_patterns`](LearningStore::list_patterns) | All patterns |
/// | [`bump_synonym_pair`](LearningStore::bump_synonym_pair) | Increment a pair's counter |
/// | [`list_synonym_pairs`](LearningStore::list_synonym_pairs) | All synonym pairs |
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn insert_interaction(&self, interaction: &Interaction) -> Result<()>;

    async fn get_interaction(&self, id: &str) -> Result<Option<Interaction>>;

    async fn list_interactions(&self) -> Result<Vec<Interaction>>;

    /// Overwrite the interaction row, append the history entry, and upsert
    /// the pattern in one atomic step. Returns the pattern as stored after
    /// the upsert.
    async fn record_feedback(&self, update: &FeedbackUpdate) -> Result<Option<Pattern>>;

    async fn get_pattern(&self, signature: &str) -> Result<Option<Pattern>>;

    async fn list_patterns(&self) -> Result<Vec<Pattern>>;

    /// Increment the counter of the unordered pair `{a, b}` and return the
    /// new count. Implementations store the pair with `term_a < term_b`.
    async fn bump_synonym_pair(&self, a: &str, b: &str) -> Result<u64>;

    async fn list_synonym_pairs(&self) -> Result<Vec<SynonymPair>>;
}

/// Merge a promotion into an existing pattern. The first answer stays
/// canonical; usage and rating totals accumulate.
pub fn merge_pattern(existing: Option<Pattern>, incoming: &Pattern) -> Pattern {
    match existing {
        None => incoming.clone(),
        Some(mut p) => {
            p.usage_count += incoming.usage_count;
            p.rating_sum += incoming.rating_sum;
            p.rating_count += incoming.rating_count;
            p.updated_at = incoming.updated_at;
            p
        }
    }
}
