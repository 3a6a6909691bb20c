//! Learned-answer lookup by token-set similarity.
//!
//! Every candidate (non-bad interactions and all patterns) is scored with
//! Jaccard similarity against the query's token set. The scan is linear in
//! the number of candidates.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::models::{Interaction, InteractionStatus, LearnedAnswer, LearnedOrigin, Pattern};

/// Default similarity a candidate must strictly exceed.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.3;

/// `|A ∩ B| / |A ∪ B|`; two empty sets score 0.
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn token_set(tokens: &[String]) -> HashSet<&str> {
    tokens.iter().map(String::as_str).collect()
}

struct Candidate<'a> {
    similarity: f64,
    avg_rating: f64,
    at: DateTime<Utc>,
    answer: &'a str,
    interaction_id: &'a str,
    signature: &'a str,
    origin: LearnedOrigin,
}

impl Candidate<'_> {
    /// Higher similarity, then higher rating, then more recent.
    fn rank(&self, other: &Self) -> Ordering {
        self.similarity
            .partial_cmp(&other.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                self.avg_rating
                    .partial_cmp(&other.avg_rating)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| self.at.cmp(&other.at))
    }
}

#[derive(Debug, Clone)]
pub struct LearningMatcher {
    threshold: f64,
}

impl Default for LearningMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl LearningMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best learned answer for `query_tokens`, if its similarity is
    /// strictly above the threshold. Confirmed-bad and unanswered
    /// interactions are skipped.
    pub fn find(
        &self,
        query_tokens: &[String],
        interactions: &[Interaction],
        patterns: &[Pattern],
    ) -> Option<LearnedAnswer> {
        let query = token_set(query_tokens);
        if query.is_empty() {
            return None;
        }

        let from_interactions = interactions
            .iter()
            .filter(|i| i.status != InteractionStatus::ConfirmedBad && !i.unanswered)
            .map(|i| Candidate {
                similarity: jaccard(&query, &token_set(&i.tokens)),
                avg_rating: i.average_rating().unwrap_or(0.0),
                at: i.created_at,
                answer: &i.answer,
                interaction_id: &i.id,
                signature: &i.signature,
                origin: LearnedOrigin::Interaction,
            });

        let from_patterns = patterns.iter().map(|p| Candidate {
            similarity: jaccard(&query, &token_set(&p.tokens)),
            avg_rating: p.average_rating(),
            at: p.updated_at,
            answer: &p.answer,
            interaction_id: &p.interaction_id,
            signature: &p.signature,
            origin: LearnedOrigin::Pattern,
        });

        let best = from_interactions
            .chain(from_patterns)
            .reduce(|best, c| if c.rank(&best) == Ordering::Greater { c } else { best })?;

        if best.similarity <= self.threshold {
            return None;
        }

        Some(LearnedAnswer {
            answer: best.answer.to_string(),
            confidence: best.similarity,
            interaction_id: best.interaction_id.to_string(),
            origin: best.origin,
            signature: best.signature.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{signature, token_list};
    use chrono::Duration;
    use proptest::prelude::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn interaction(id: &str, query: &str, answer: &str, rating: Option<u8>) -> Interaction {
        let tokens = token_list(&toks(query));
        let status = match rating {
            Some(r) if r >= 4 => InteractionStatus::ConfirmedGood,
            Some(r) if r <= 2 => InteractionStatus::ConfirmedBad,
            _ => InteractionStatus::Pending,
        };
        Interaction {
            id: id.to_string(),
            query: query.to_string(),
            signature: signature(&tokens),
            tokens,
            answer: answer.to_string(),
            sources: Vec::new(),
            user_id: "u".into(),
            created_at: Utc::now(),
            ratings: Vec::new(),
            rating,
            status,
            promoted: false,
            matched_signature: None,
            unanswered: false,
        }
    }

    #[test]
    fn test_jaccard_basics() {
        let a: HashSet<&str> = ["x", "y"].into_iter().collect();
        let b: HashSet<&str> = ["y", "z"].into_iter().collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard::<&str>(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn test_similar_query_matches() {
        let rated = interaction("i1", "quyền sử dụng đất", "X", Some(5));
        let got = LearningMatcher::default()
            .find(&toks("quyền sử dụng đất đai"), &[rated], &[])
            .unwrap();
        assert_eq!(got.answer, "X");
        assert_eq!(got.interaction_id, "i1");
        assert_eq!(got.origin, LearnedOrigin::Interaction);
        assert!((got.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        // J = 3/10
        let i = interaction("i1", "a b c d e f g h", "X", Some(5));
        let m = LearningMatcher::default();
        assert!(m.find(&toks("a b c x y"), &[i.clone()], &[]).is_none());
        assert!(LearningMatcher::new(0.29)
            .find(&toks("a b c x y"), &[i], &[])
            .is_some());
    }

    #[test]
    fn test_confirmed_bad_is_skipped() {
        let bad = interaction("i1", "thuế đất", "wrong", Some(1));
        assert!(LearningMatcher::default()
            .find(&toks("thuế đất"), &[bad], &[])
            .is_none());
    }

    #[test]
    fn test_unanswered_is_skipped() {
        let mut miss = interaction("miss", "bồi thường đất", "không tìm thấy", None);
        miss.unanswered = true;
        let answered = interaction("hit", "bồi thường thu hồi đất", "Điều 69", None);

        let m = LearningMatcher::default();
        assert!(m.find(&toks("bồi thường đất"), &[miss.clone()], &[]).is_none());
        let got = m.find(&toks("bồi thường đất"), &[miss, answered], &[]).unwrap();
        assert_eq!(got.interaction_id, "hit");
    }

    #[test]
    fn test_tie_prefers_higher_rating_then_recency() {
        let mut low = interaction("low", "thuế đất", "A", Some(3));
        let high = interaction("high", "thuế đất", "B", Some(5));
        let got = LearningMatcher::default()
            .find(&toks("thuế đất"), &[low.clone(), high.clone()], &[])
            .unwrap();
        assert_eq!(got.interaction_id, "high");

        low.rating = Some(5);
        low.created_at = high.created_at + Duration::seconds(10);
        let got = LearningMatcher::default()
            .find(&toks("thuế đất"), &[high, low], &[])
            .unwrap();
        assert_eq!(got.interaction_id, "low");
    }

    #[test]
    fn test_patterns_are_candidates() {
        let source = interaction("i1", "bồi thường đất", "P", Some(5));
        let pattern = Pattern::from_interaction(&source, 5, Utc::now());
        let got = LearningMatcher::default()
            .find(&toks("bồi thường đất"), &[], &[pattern])
            .unwrap();
        assert_eq!(got.origin, LearnedOrigin::Pattern);
        assert_eq!(got.signature, "bồi thường đất");
        assert_eq!(got.confidence, 1.0);
    }

    #[test]
    fn test_empty_query_never_matches() {
        let i = interaction("i1", "đất", "X", Some(5));
        assert!(LearningMatcher::default().find(&[], &[i], &[]).is_none());
    }

    proptest! {
        #[test]
        fn prop_jaccard_symmetric_and_bounded(
            a in prop::collection::hash_set("[a-f]", 0..6),
            b in prop::collection::hash_set("[a-f]", 0..6),
        ) {
            let j = jaccard(&a, &b);
            prop_assert_eq!(j, jaccard(&b, &a));
            prop_assert!((0.0..=1.0).contains(&j));
        }

        #[test]
        fn prop_match_exceeds_threshold(
            queries in prop::collection::vec("[a-f]( [a-f]){0,4}", 0..8),
            q in "[a-f]( [a-f]){0,4}",
            threshold in 0.0f64..1.0,
        ) {
            let interactions: Vec<Interaction> = queries
                .iter()
                .enumerate()
                .map(|(n, text)| interaction(&n.to_string(), text, "ans", Some(4)))
                .collect();
            if let Some(found) = LearningMatcher::new(threshold).find(&toks(&q), &interactions, &[]) {
                prop_assert!(found.confidence > threshold);
            }
        }
    }
}
