//! Scalar confidence for a retrieval or learned-answer outcome.

use std::fmt;

use serde::Serialize;

use crate::models::{LearnedAnswer, Retrieved, Strategy};

/// Coarse confidence bands shown alongside an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            ConfidenceLevel::VeryHigh
        } else if score >= 0.65 {
            ConfidenceLevel::High
        } else if score >= 0.45 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::VeryHigh => "very_high",
        })
    }
}

/// Confidence of a retrieval result, in `[0.0, 1.0]`.
pub fn estimate(result: &Retrieved) -> f64 {
    let Some(strategy) = result.strategy() else {
        return 0.0;
    };
    match strategy {
        Strategy::ArticleExact | Strategy::ArticleSubstring => 1.0,
        Strategy::Semantic | Strategy::Lexical | Strategy::Keyword => result
            .hits()
            .first()
            .map(|h| h.score.clamp(0.0, 1.0))
            .unwrap_or(0.0),
    }
}

/// Confidence of a learned answer: its Jaccard similarity.
pub fn estimate_learned(answer: &LearnedAnswer) -> f64 {
    answer.confidence.clamp(0.0, 1.0)
}
