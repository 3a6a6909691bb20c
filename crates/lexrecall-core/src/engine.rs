//! The engine facade: one value owning the snapshot cell, the router, the
//! learning matcher, and the feedback processor.
//!
//! Collaborators are injected at construction; nothing here is global.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lexrecall_core::engine::{Engine, EngineParams};
//! use lexrecall_core::models::SearchMode;
//! use lexrecall_core::normalize::SimpleNormalizer;
//! use lexrecall_core::store::memory::InMemoryStore;
//!
//! # async fn example() -> Result<(), lexrecall_core::error::EngineError> {
//! let store = Arc::new(InMemoryStore::new());
//! let engine = Engine::new(
//!     store.clone(),
//!     store,
//!     None,
//!     Arc::new(SimpleNormalizer::default()),
//!     EngineParams::default(),
//! );
//! engine.rebuild_index().await?;
//! let result = engine.retrieve("Điều 69", None, SearchMode::Auto).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::feedback::{FeedbackOutcome, FeedbackParams, FeedbackProcessor};
use crate::index::{embed_documents, Indexer, Snapshot, SnapshotCell, TfIdfParams};
use crate::learning::{LearningMatcher, DEFAULT_MATCH_THRESHOLD};
use crate::lexical::{LexicalParams, LexicalScorer};
use crate::models::{
    Interaction, InteractionStatus, LearnedAnswer, LearningStats, NewInteraction, Retrieved,
    SearchMode, TopQuestion,
};
use crate::normalize::{signature, token_list, QueryNormalizer};
use crate::router::{RouteQuery, Router};
use crate::semantic::{SemanticScorer, DEFAULT_SEMANTIC_FLOOR};
use crate::store::{DocumentSource, LearningStore};

/// Tunables for an [`Engine`], decoupled from any config file format.
#[derive(Debug, Clone)]
pub struct EngineParams {
    /// Results returned when the caller does not pass `k`.
    pub top_k: usize,
    pub lexical: LexicalParams,
    pub semantic_floor: f64,
    /// Jaccard similarity a learned answer must strictly exceed.
    pub match_threshold: f64,
    pub feedback: FeedbackParams,
    /// Counter a synonym pair needs before it is exposed.
    pub synonym_min_count: u64,
    pub expand_synonyms: bool,
    pub embed_timeout: Duration,
    pub embed_batch_size: usize,
    pub tfidf: TfIdfParams,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            lexical: LexicalParams::default(),
            semantic_floor: DEFAULT_SEMANTIC_FLOOR,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            feedback: FeedbackParams::default(),
            synonym_min_count: 2,
            expand_synonyms: true,
            embed_timeout: Duration::from_millis(3000),
            embed_batch_size: 64,
            tfidf: TfIdfParams::default(),
        }
    }
}

/// Summary of a completed [`Engine::rebuild_index`].
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub documents: usize,
    pub terms: usize,
    pub embedded: bool,
    pub embedding_model: Option<String>,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    /// False when the corpus fingerprint matches the previous snapshot.
    pub changed: bool,
    pub elapsed_ms: u64,
}

pub struct Engine {
    documents: Arc<dyn DocumentSource>,
    store: Arc<dyn LearningStore>,
    embedder: Option<Arc<dyn Embedder>>,
    normalizer: Arc<dyn QueryNormalizer>,
    indexer: Indexer,
    router: Router,
    matcher: LearningMatcher,
    feedback: FeedbackProcessor,
    cell: SnapshotCell,
    rebuild_gate: Mutex<()>,
    params: EngineParams,
}

impl Engine {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        store: Arc<dyn LearningStore>,
        embedder: Option<Arc<dyn Embedder>>,
        normalizer: Arc<dyn QueryNormalizer>,
        params: EngineParams,
    ) -> Self {
        let router = Router::new(
            documents.clone(),
            normalizer.clone(),
            embedder.clone(),
            LexicalScorer::new(params.lexical.clone()),
            SemanticScorer::new(params.semantic_floor),
            params.embed_timeout,
        );
        Self {
            indexer: Indexer::new(normalizer.clone(), params.tfidf.clone()),
            matcher: LearningMatcher::new(params.match_threshold),
            feedback: FeedbackProcessor::new(store.clone(), params.feedback.clone()),
            cell: SnapshotCell::new(),
            rebuild_gate: Mutex::new(()),
            documents,
            store,
            embedder,
            normalizer,
            router,
            params,
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// The snapshot currently served, if one has been built.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.cell.load()
    }

    /// Rebuild the snapshot from the document source and swap it in.
    ///
    /// Returns [`EngineError::Conflict`] if another rebuild is running;
    /// readers keep the previous snapshot throughout. An embedding failure
    /// still installs a lexical-only snapshot.
    pub async fn rebuild_index(&self) -> EngineResult<RebuildReport> {
        let _gate = self
            .rebuild_gate
            .try_lock()
            .map_err(|_| EngineError::Conflict)?;
        let started = Instant::now();

        let documents = self.documents.list_documents().await?;

        let (embeddings, model) = match &self.embedder {
            Some(embedder) if !documents.is_empty() => {
                match embed_documents(embedder.as_ref(), &documents, self.params.embed_batch_size)
                    .await
                {
                    Ok(vectors) => (Some(vectors), Some(embedder.model_name().to_string())),
                    Err(e) => {
                        warn!(error = %e, "embedding failed during rebuild; snapshot will be lexical-only");
                        (None, None)
                    }
                }
            }
            _ => (None, None),
        };

        let snapshot = self
            .indexer
            .build_with_embeddings(documents, embeddings, model);
        let mut report = RebuildReport {
            documents: snapshot.len(),
            terms: snapshot.tfidf().vocab_len(),
            embedded: snapshot.embeddings().is_some(),
            embedding_model: snapshot.embedding_model().map(str::to_string),
            fingerprint: snapshot.fingerprint().to_string(),
            built_at: snapshot.built_at(),
            changed: true,
            elapsed_ms: 0,
        };

        if let Some(previous) = self.cell.swap(snapshot) {
            report.changed = previous.fingerprint() != report.fingerprint;
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            documents = report.documents,
            terms = report.terms,
            embedded = report.embedded,
            changed = report.changed,
            elapsed_ms = report.elapsed_ms,
            "index rebuilt"
        );
        Ok(report)
    }

    /// Retrieve passages for `query`.
    ///
    /// `k` defaults to [`EngineParams::top_k`]. An empty query is
    /// [`EngineError::InvalidInput`]; "nothing found" is
    /// [`Retrieved::NoMatch`].
    pub async fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        mode: SearchMode,
    ) -> EngineResult<Retrieved> {
        let text = query.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput {
                reason: "query must not be empty".into(),
            });
        }
        let k = k.unwrap_or(self.params.top_k);
        if k == 0 {
            return Err(EngineError::InvalidInput {
                reason: "k must be at least 1".into(),
            });
        }

        let tokens = self.normalizer.normalize(text);
        let expanded = if matches!(mode, SearchMode::Auto | SearchMode::Tfidf) {
            self.expand_tokens(&tokens).await?
        } else {
            tokens.clone()
        };

        let snapshot = self.cell.load();
        let query = RouteQuery {
            text,
            tokens: &tokens,
            expanded: &expanded,
        };
        self.router.route(query, snapshot.as_deref(), k, mode).await
    }

    /// Append learned synonyms of each token, when expansion is enabled.
    async fn expand_tokens(&self, tokens: &[String]) -> EngineResult<Vec<String>> {
        let mut expanded = tokens.to_vec();
        if !self.params.expand_synonyms || tokens.is_empty() {
            return Ok(expanded);
        }

        let pairs = self.store.list_synonym_pairs().await?;
        let mut seen: HashSet<String> = tokens.iter().cloned().collect();
        for token in tokens {
            for pair in pairs
                .iter()
                .filter(|p| p.count >= self.params.synonym_min_count)
            {
                if let Some(partner) = pair.partner(token) {
                    if seen.insert(partner.to_string()) {
                        expanded.push(partner.to_string());
                    }
                }
            }
        }
        if expanded.len() > tokens.len() {
            debug!(added = expanded.len() - tokens.len(), "expanded query with synonyms");
        }
        Ok(expanded)
    }

    /// Reuse a previously rated answer for a similar query, if any.
    pub async fn find_learned_answer(&self, query: &str) -> EngineResult<Option<LearnedAnswer>> {
        let tokens = self.normalizer.normalize(query);
        if tokens.is_empty() {
            return Ok(None);
        }
        let interactions = self.store.list_interactions().await?;
        let patterns = self.store.list_patterns().await?;
        let found = self.matcher.find(&tokens, &interactions, &patterns);
        if let Some(answer) = &found {
            debug!(
                interaction = %answer.interaction_id,
                confidence = answer.confidence,
                "learned answer matched"
            );
        }
        Ok(found)
    }

    /// Store a new interaction and return its id.
    pub async fn record_interaction(&self, new: NewInteraction) -> EngineResult<String> {
        if new.query.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                reason: "interaction query must not be empty".into(),
            });
        }
        let tokens = token_list(&self.normalizer.normalize(&new.query));
        let interaction = Interaction {
            id: uuid::Uuid::new_v4().to_string(),
            signature: signature(&tokens),
            tokens,
            query: new.query,
            answer: new.answer,
            sources: new.sources,
            user_id: new.user_id,
            created_at: Utc::now(),
            ratings: Vec::new(),
            rating: None,
            status: InteractionStatus::Pending,
            promoted: false,
            matched_signature: new.matched_signature,
            unanswered: new.unanswered,
        };
        self.store.insert_interaction(&interaction).await?;
        debug!(interaction = %interaction.id, signature = %interaction.signature, "interaction recorded");
        Ok(interaction.id)
    }

    /// Rate an interaction. See [`FeedbackProcessor::submit`].
    pub async fn submit_feedback(
        &self,
        interaction_id: &str,
        rating: i64,
        feedback: Option<String>,
    ) -> EngineResult<FeedbackOutcome> {
        self.feedback.submit(interaction_id, rating, feedback).await
    }

    /// Aggregates recomputed from the store on every call.
    pub async fn learning_stats(&self) -> EngineResult<LearningStats> {
        let interactions = self.store.list_interactions().await?;
        let patterns = self.store.list_patterns().await?;
        let pairs = self.store.list_synonym_pairs().await?;

        let fb = &self.params.feedback;
        let rated: Vec<u8> = interactions.iter().filter_map(|i| i.rating).collect();
        let avg_rating = if rated.is_empty() {
            0.0
        } else {
            rated.iter().map(|&r| f64::from(r)).sum::<f64>() / rated.len() as f64
        };

        Ok(LearningStats {
            total_interactions: interactions.len() as u64,
            positive_feedback: rated.iter().filter(|&&r| r >= fb.positive_min_rating).count() as u64,
            negative_feedback: rated.iter().filter(|&&r| r <= fb.negative_max_rating).count() as u64,
            avg_rating,
            total_patterns_learned: patterns.len() as u64,
            total_synonym_pairs: pairs.len() as u64,
            interactions_with_feedback: rated.len() as u64,
        })
    }

    /// Most frequently asked questions, grouped by signature.
    ///
    /// Ordered by count, then average rating, then signature.
    pub async fn top_questions(&self, limit: usize) -> EngineResult<Vec<TopQuestion>> {
        struct Group<'a> {
            question: &'a str,
            count: u64,
            rating_sum: f64,
            rated: u64,
        }

        let interactions = self.store.list_interactions().await?;
        let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();
        for i in &interactions {
            let g = groups.entry(i.signature.as_str()).or_insert(Group {
                question: &i.query,
                count: 0,
                rating_sum: 0.0,
                rated: 0,
            });
            g.count += 1;
            if let Some(r) = i.rating {
                g.rating_sum += f64::from(r);
                g.rated += 1;
            }
        }

        let mut top: Vec<TopQuestion> = groups
            .into_iter()
            .map(|(sig, g)| TopQuestion {
                question: g.question.to_string(),
                signature: sig.to_string(),
                count: g.count,
                avg_rating: if g.rated == 0 {
                    0.0
                } else {
                    g.rating_sum / g.rated as f64
                },
            })
            .collect();
        top.sort_by(|a, b| {
            b.count.cmp(&a.count).then_with(|| {
                b.avg_rating
                    .partial_cmp(&a.avg_rating)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        top.truncate(limit);
        Ok(top)
    }

    /// Learned synonyms of `term` whose counter reached the threshold,
    /// strongest first.
    pub async fn synonyms(&self, term: &str) -> EngineResult<Vec<String>> {
        let term = term.trim().to_lowercase();
        let mut partners: Vec<(String, u64)> = self
            .store
            .list_synonym_pairs()
            .await?
            .into_iter()
            .filter(|p| p.count >= self.params.synonym_min_count)
            .filter_map(|p| p.partner(&term).map(|s| (s.to_string(), p.count)))
            .collect();
        partners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(partners.into_iter().map(|(s, _)| s).collect())
    }
}
