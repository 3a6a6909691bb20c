//! Core data models shared by the retrieval and learning pipelines.
//!
//! Documents flow in from a [`DocumentSource`](crate::store::DocumentSource)
//! and are read-only here. Interactions, patterns, and synonym pairs are the
//! learning state persisted through a [`LearningStore`](crate::store::LearningStore).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A legal passage as exposed by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub section: String,
    /// Structured article number (`Điều 69` → `69`), when the source has one.
    #[serde(default)]
    pub article_number: Option<u32>,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A single ranked passage returned by [`retrieve`](crate::engine::Engine::retrieve).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub doc_id: String,
    pub title: String,
    pub section: String,
    pub text: String,
    /// Relevance score in `[0.0, 1.0]`.
    pub score: f64,
    pub url: Option<String>,
}

impl Hit {
    pub fn from_document(doc: &Document, score: f64) -> Self {
        Self {
            doc_id: doc.id.clone(),
            title: doc.title.clone(),
            section: doc.section.clone(),
            text: doc.text.clone(),
            score,
            url: doc.url.clone(),
        }
    }
}

/// Which retrieval strategy produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ArticleExact,
    ArticleSubstring,
    Semantic,
    Lexical,
    Keyword,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::ArticleExact => "article-exact",
            Strategy::ArticleSubstring => "article-substring",
            Strategy::Semantic => "semantic",
            Strategy::Lexical => "tfidf",
            Strategy::Keyword => "keyword",
        };
        f.write_str(s)
    }
}

/// Outcome of a retrieval call.
///
/// `NoMatch` is distinct from a hit that happens to score zero; `Hits`
/// always carries at least one hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Retrieved {
    NoMatch,
    Hits { strategy: Strategy, hits: Vec<Hit> },
}

impl Retrieved {
    /// Wrap a hit list, collapsing an empty list into [`Retrieved::NoMatch`].
    pub fn from_hits(strategy: Strategy, hits: Vec<Hit>) -> Self {
        if hits.is_empty() {
            Retrieved::NoMatch
        } else {
            Retrieved::Hits { strategy, hits }
        }
    }

    pub fn hits(&self) -> &[Hit] {
        match self {
            Retrieved::NoMatch => &[],
            Retrieved::Hits { hits, .. } => hits,
        }
    }

    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            Retrieved::NoMatch => None,
            Retrieved::Hits { strategy, .. } => Some(*strategy),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Retrieved::NoMatch)
    }
}

/// Retrieval mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Auto,
    Keyword,
    Semantic,
    Article,
    Tfidf,
}

impl FromStr for SearchMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchMode::Auto),
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "article" => Ok(SearchMode::Article),
            "tfidf" | "lexical" => Ok(SearchMode::Tfidf),
            other => Err(EngineError::InvalidInput {
                reason: format!(
                    "unknown search mode '{}'. Use auto, keyword, semantic, article, or tfidf",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Auto => "auto",
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Article => "article",
            SearchMode::Tfidf => "tfidf",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an interaction, driven by its latest rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    ConfirmedGood,
    ConfirmedBad,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Pending => "pending",
            InteractionStatus::ConfirmedGood => "confirmed_good",
            InteractionStatus::ConfirmedBad => "confirmed_bad",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InteractionStatus::Pending),
            "confirmed_good" => Some(InteractionStatus::ConfirmedGood),
            "confirmed_bad" => Some(InteractionStatus::ConfirmedBad),
            _ => None,
        }
    }
}

/// One entry of an interaction's append-only rating history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub rating: u8,
    pub feedback: Option<String>,
    pub at: DateTime<Utc>,
}

/// A recorded question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub query: String,
    /// Sorted, deduplicated tokens joined by a single space.
    pub signature: String,
    pub tokens: Vec<String>,
    pub answer: String,
    pub sources: Vec<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub ratings: Vec<RatingEntry>,
    /// Effective rating; each submission overwrites the previous one.
    pub rating: Option<u8>,
    pub status: InteractionStatus,
    /// Set once the interaction has been merged into a [`Pattern`].
    pub promoted: bool,
    /// Signature of the pattern this answer was served from, if any.
    pub matched_signature: Option<String>,
    /// Recorded without a corpus answer. Ratable, but never served back or
    /// promoted.
    #[serde(default)]
    pub unanswered: bool,
}

impl Interaction {
    /// Average over the effective ratings. Ratings overwrite, so this is
    /// the latest submitted rating.
    pub fn average_rating(&self) -> Option<f64> {
        self.rating.map(f64::from)
    }
}

/// Input for [`record_interaction`](crate::engine::Engine::record_interaction).
#[derive(Debug, Clone, Default)]
pub struct NewInteraction {
    pub query: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub user_id: String,
    pub matched_signature: Option<String>,
    pub unanswered: bool,
}

/// A reusable answer promoted from well-rated interactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub signature: String,
    pub tokens: Vec<String>,
    pub answer: String,
    /// Interaction that first created this pattern.
    pub interaction_id: String,
    pub usage_count: u64,
    pub rating_sum: f64,
    pub rating_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    pub fn from_interaction(interaction: &Interaction, rating: u8, now: DateTime<Utc>) -> Self {
        Self {
            signature: interaction.signature.clone(),
            tokens: interaction.tokens.clone(),
            answer: interaction.answer.clone(),
            interaction_id: interaction.id.clone(),
            usage_count: 1,
            rating_sum: f64::from(rating),
            rating_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn average_rating(&self) -> f64 {
        if self.rating_count == 0 {
            0.0
        } else {
            self.rating_sum / self.rating_count as f64
        }
    }
}

/// Learned co-occurrence between two query terms. Stored with `term_a < term_b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymPair {
    pub term_a: String,
    pub term_b: String,
    pub count: u64,
}

impl SynonymPair {
    /// Order a pair canonically. Returns `None` for identical terms.
    pub fn ordered<'a>(a: &'a str, b: &'a str) -> Option<(&'a str, &'a str)> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some((a, b)),
            std::cmp::Ordering::Greater => Some((b, a)),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The other half of the pair, if `term` belongs to it.
    pub fn partner(&self, term: &str) -> Option<&str> {
        if self.term_a == term {
            Some(&self.term_b)
        } else if self.term_b == term {
            Some(&self.term_a)
        } else {
            None
        }
    }
}

/// Where a learned answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnedOrigin {
    Interaction,
    Pattern,
}

/// A previously rated answer reused for a similar query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedAnswer {
    pub answer: String,
    /// Jaccard similarity between the query and the matched signature.
    pub confidence: f64,
    pub interaction_id: String,
    pub origin: LearnedOrigin,
    pub signature: String,
}

/// Aggregates derived from the learning store on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningStats {
    pub total_interactions: u64,
    pub positive_feedback: u64,
    pub negative_feedback: u64,
    pub avg_rating: f64,
    pub total_patterns_learned: u64,
    pub total_synonym_pairs: u64,
    pub interactions_with_feedback: u64,
}

/// A frequently asked question, grouped by signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopQuestion {
    pub question: String,
    pub signature: String,
    pub count: u64,
    pub avg_rating: f64,
}
