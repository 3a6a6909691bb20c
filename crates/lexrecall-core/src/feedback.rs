//! Rating submission, pattern promotion, and synonym growth.
//!
//! Submissions for the same interaction id are serialized through a
//! per-id async mutex; different ids proceed in parallel. The interaction
//! update, history append, and pattern upsert go to the store as one
//! [`FeedbackUpdate`].

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::models::{Interaction, InteractionStatus, Pattern, RatingEntry};
use crate::store::{FeedbackUpdate, LearningStore};

/// Rating thresholds for status derivation and promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackParams {
    /// Average rating at which an interaction is promoted to a pattern.
    pub promote_min_rating: f64,
    /// Ratings at or above this are positive (confirmed good).
    pub positive_min_rating: u8,
    /// Ratings at or below this are negative (confirmed bad).
    pub negative_max_rating: u8,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self {
            promote_min_rating: 4.0,
            positive_min_rating: 4,
            negative_max_rating: 2,
        }
    }
}

impl FeedbackParams {
    pub fn status_for(&self, rating: u8) -> InteractionStatus {
        if rating >= self.positive_min_rating {
            InteractionStatus::ConfirmedGood
        } else if rating <= self.negative_max_rating {
            InteractionStatus::ConfirmedBad
        } else {
            InteractionStatus::Pending
        }
    }
}

/// Result of a successful [`submit`](FeedbackProcessor::submit).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub interaction_id: String,
    pub rating: u8,
    pub status: InteractionStatus,
    pub average_rating: f64,
    /// The pattern as stored, when this submission promoted the interaction.
    pub promoted: Option<Pattern>,
    /// Number of synonym pairs whose counter was incremented.
    pub synonym_pairs_bumped: usize,
}

/// Checks a raw rating is in `1..=5`.
pub fn validate_rating(rating: i64) -> EngineResult<u8> {
    match u8::try_from(rating) {
        Ok(r @ 1..=5) => Ok(r),
        _ => Err(EngineError::InvalidRating { rating }),
    }
}

/// Term pairs linking a query to the pattern it was served from:
/// `(a, b)` for `a` only in the query and `b` only in the pattern.
pub fn synonym_candidates(query_tokens: &[String], pattern_tokens: &[String]) -> Vec<(String, String)> {
    let query: BTreeSet<&str> = query_tokens.iter().map(String::as_str).collect();
    let pattern: BTreeSet<&str> = pattern_tokens.iter().map(String::as_str).collect();

    let mut pairs = Vec::new();
    for a in query.difference(&pattern) {
        for b in pattern.difference(&query) {
            pairs.push((a.to_string(), b.to_string()));
        }
    }
    pairs
}

pub struct FeedbackProcessor {
    store: Arc<dyn LearningStore>,
    params: FeedbackParams,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FeedbackProcessor {
    pub fn new(store: Arc<dyn LearningStore>, params: FeedbackParams) -> Self {
        Self {
            store,
            params,
            locks: DashMap::new(),
        }
    }

    pub fn params(&self) -> &FeedbackParams {
        &self.params
    }

    /// Apply a rating to an interaction.
    ///
    /// The rating is validated before any state is read, so an invalid
    /// rating on an unknown id reports [`EngineError::InvalidRating`].
    pub async fn submit(
        &self,
        interaction_id: &str,
        rating: i64,
        feedback: Option<String>,
    ) -> EngineResult<FeedbackOutcome> {
        let rating = validate_rating(rating)?;

        let lock = self
            .locks
            .entry(interaction_id.to_string())
            .or_default()
            .clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.apply(interaction_id, rating, feedback).await
        };
        drop(lock);
        self.locks
            .remove_if(interaction_id, |_, l| Arc::strong_count(l) == 1);

        outcome
    }

    async fn apply(
        &self,
        interaction_id: &str,
        rating: u8,
        feedback: Option<String>,
    ) -> EngineResult<FeedbackOutcome> {
        let mut interaction = self
            .store
            .get_interaction(interaction_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "interaction",
                id: interaction_id.to_string(),
            })?;

        let now = Utc::now();
        let entry = RatingEntry {
            rating,
            feedback,
            at: now,
        };
        interaction.ratings.push(entry.clone());
        interaction.rating = Some(rating);
        interaction.status = self.params.status_for(rating);

        let average_rating = interaction.average_rating().unwrap_or(f64::from(rating));
        let promote = if average_rating >= self.params.promote_min_rating
            && !interaction.promoted
            && !interaction.unanswered
        {
            interaction.promoted = true;
            Some(Pattern::from_interaction(&interaction, rating, now))
        } else {
            None
        };

        let update = FeedbackUpdate {
            interaction,
            entry,
            promote,
        };
        let promoted = self.store.record_feedback(&update).await?;
        let interaction = update.interaction;

        if let Some(pattern) = &promoted {
            info!(
                interaction = %interaction.id,
                signature = %pattern.signature,
                usage_count = pattern.usage_count,
                "promoted interaction to pattern"
            );
        }

        let synonym_pairs_bumped = if rating >= self.params.positive_min_rating {
            self.grow_synonyms(&interaction).await?
        } else {
            0
        };

        debug!(
            interaction = %interaction.id,
            rating,
            status = interaction.status.as_str(),
            "feedback recorded"
        );

        Ok(FeedbackOutcome {
            interaction_id: interaction.id,
            rating,
            status: interaction.status,
            average_rating,
            promoted,
            synonym_pairs_bumped,
        })
    }

    async fn grow_synonyms(&self, interaction: &Interaction) -> EngineResult<usize> {
        let Some(signature) = interaction.matched_signature.as_deref() else {
            return Ok(0);
        };
        let Some(pattern) = self.store.get_pattern(signature).await? else {
            debug!(signature, "served pattern no longer exists; skipping synonym growth");
            return Ok(0);
        };

        let pairs = synonym_candidates(&interaction.tokens, &pattern.tokens);
        for (a, b) in &pairs {
            self.store.bump_synonym_pair(a, b).await?;
        }
        Ok(pairs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{signature, token_list};
    use crate::store::memory::InMemoryStore;
    use std::time::Duration;

    fn toks(s: &str) -> Vec<String> {
        token_list(&s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
    }

    fn interaction(id: &str, query: &str, matched: Option<&str>) -> Interaction {
        let tokens = toks(query);
        Interaction {
            id: id.to_string(),
            query: query.to_string(),
            signature: signature(&tokens),
            tokens,
            answer: format!("answer {}", id),
            sources: Vec::new(),
            user_id: "u".into(),
            created_at: Utc::now(),
            ratings: Vec::new(),
            rating: None,
            status: InteractionStatus::Pending,
            promoted: false,
            matched_signature: matched.map(str::to_string),
            unanswered: false,
        }
    }

    async fn setup(interactions: &[Interaction]) -> (Arc<InMemoryStore>, FeedbackProcessor) {
        let store = Arc::new(InMemoryStore::new());
        for i in interactions {
            store.insert_interaction(i).await.unwrap();
        }
        let processor = FeedbackProcessor::new(store.clone(), FeedbackParams::default());
        (store, processor)
    }

    #[test]
    fn test_validate_rating() {
        assert_eq!(validate_rating(1).unwrap(), 1);
        assert_eq!(validate_rating(5).unwrap(), 5);
        for bad in [0, 6, -1, 300] {
            assert!(matches!(
                validate_rating(bad),
                Err(EngineError::InvalidRating { rating }) if rating == bad
            ));
        }
    }

    #[test]
    fn test_synonym_candidates() {
        let pairs = synonym_candidates(&toks("mua đất"), &toks("chuyển nhượng đất"));
        assert_eq!(
            pairs,
            vec![
                ("mua".to_string(), "chuyển".to_string()),
                ("mua".to_string(), "nhượng".to_string()),
            ]
        );
        assert!(synonym_candidates(&toks("đất"), &toks("đất")).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_rating_leaves_state_untouched() {
        let (store, processor) = setup(&[interaction("i1", "đất", None)]).await;
        for bad in [0, 6] {
            let err = processor.submit("i1", bad, None).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidRating { .. }));
        }
        let stored = store.get_interaction("i1").await.unwrap().unwrap();
        assert!(stored.ratings.is_empty());
        assert_eq!(stored.rating, None);
    }

    #[tokio::test]
    async fn test_invalid_rating_checked_before_lookup() {
        let (_, processor) = setup(&[]).await;
        let err = processor.submit("ghost", 9, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRating { .. }));
        let err = processor.submit("ghost", 3, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_status_follows_latest_rating() {
        let (store, processor) = setup(&[interaction("i1", "thuế đất", None)]).await;

        let out = processor.submit("i1", 3, Some("tạm".into())).await.unwrap();
        assert_eq!(out.status, InteractionStatus::Pending);
        assert!(out.promoted.is_none());

        let out = processor.submit("i1", 1, None).await.unwrap();
        assert_eq!(out.status, InteractionStatus::ConfirmedBad);
        assert_eq!(out.average_rating, 1.0);

        let stored = store.get_interaction("i1").await.unwrap().unwrap();
        assert_eq!(stored.ratings.len(), 2);
        assert_eq!(stored.ratings[0].feedback.as_deref(), Some("tạm"));
        assert_eq!(stored.rating, Some(1));
    }

    #[tokio::test]
    async fn test_unanswered_is_rated_but_never_promoted() {
        let mut miss = interaction("i1", "bồi thường đất", None);
        miss.unanswered = true;
        let (store, processor) = setup(&[miss]).await;

        let out = processor.submit("i1", 5, Some("cần bổ sung".into())).await.unwrap();
        assert_eq!(out.status, InteractionStatus::ConfirmedGood);
        assert!(out.promoted.is_none());

        let stored = store.get_interaction("i1").await.unwrap().unwrap();
        assert_eq!(stored.ratings.len(), 1);
        assert!(!stored.promoted);
        assert!(store.list_patterns().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_three_good_ratings_share_one_pattern() {
        let (store, processor) = setup(&[
            interaction("i1", "quyền sử dụng đất", None),
            interaction("i2", "đất quyền sử dụng", None),
            interaction("i3", "sử dụng đất quyền", None),
        ])
        .await;

        for id in ["i1", "i2", "i3"] {
            let out = processor.submit(id, 5, None).await.unwrap();
            assert!(out.promoted.is_some());
        }

        let patterns = store.list_patterns().await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].usage_count, 3);
        assert_eq!(patterns[0].interaction_id, "i1");
    }

    #[tokio::test]
    async fn test_rerating_never_double_counts() {
        let (store, processor) = setup(&[interaction("i1", "bồi thường", None)]).await;
        processor.submit("i1", 5, None).await.unwrap();
        let again = processor.submit("i1", 4, None).await.unwrap();
        assert!(again.promoted.is_none());
        processor.submit("i1", 1, None).await.unwrap();
        processor.submit("i1", 5, None).await.unwrap();

        let pattern = store.get_pattern("bồi thường").await.unwrap().unwrap();
        assert_eq!(pattern.usage_count, 1);
    }

    #[tokio::test]
    async fn test_positive_rating_grows_synonyms() {
        let (store, processor) = setup(&[
            interaction("src", "chuyển nhượng đất", None),
            interaction("served", "mua đất", Some("chuyển nhượng đất")),
        ])
        .await;
        processor.submit("src", 5, None).await.unwrap();

        let out = processor.submit("served", 4, None).await.unwrap();
        assert_eq!(out.synonym_pairs_bumped, 2);
        processor.submit("served", 5, None).await.unwrap();

        let pairs = store.list_synonym_pairs().await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.count == 2));
        assert!(pairs.iter().any(|p| p.partner("mua") == Some("nhượng")));
    }

    #[tokio::test]
    async fn test_negative_rating_does_not_grow_synonyms() {
        let (store, processor) = setup(&[
            interaction("src", "chuyển nhượng đất", None),
            interaction("served", "mua đất", Some("chuyển nhượng đất")),
        ])
        .await;
        processor.submit("src", 5, None).await.unwrap();
        let out = processor.submit("served", 2, None).await.unwrap();
        assert_eq!(out.synonym_pairs_bumped, 0);
        assert!(store.list_synonym_pairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_same_id() {
        let (store, processor) = setup(&[interaction("i1", "đất", None)]).await;
        let processor = Arc::new(processor);

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let p = processor.clone();
                tokio::spawn(async move { p.submit("i1", 1 + (n % 5), None).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        let stored = store.get_interaction("i1").await.unwrap().unwrap();
        assert_eq!(stored.ratings.len(), 8);
        assert!(processor.locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_ids_do_not_wait_on_each_other() {
        let (store, processor) = setup(&[
            interaction("i1", "thuế đất", None),
            interaction("i2", "bồi thường", None),
        ])
        .await;
        let processor = Arc::new(processor);

        let held = processor.locks.entry("i1".to_string()).or_default().clone();
        let guard = held.lock().await;

        let other = tokio::time::timeout(Duration::from_secs(5), processor.submit("i2", 4, None))
            .await
            .expect("i2 waited on the i1 lock");
        assert_eq!(other.unwrap().status, InteractionStatus::ConfirmedGood);

        let p = processor.clone();
        let blocked = tokio::spawn(async move { p.submit("i1", 5, None).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());
        let stored = store.get_interaction("i1").await.unwrap().unwrap();
        assert!(stored.ratings.is_empty());

        drop(guard);
        blocked.await.unwrap().unwrap();
        let stored = store.get_interaction("i1").await.unwrap().unwrap();
        assert_eq!(stored.rating, Some(5));
    }
}
