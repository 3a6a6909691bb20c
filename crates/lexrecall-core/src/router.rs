//! Strategy selection for a retrieval request.
//!
//! # Auto cascade
//!
//! The first strategy that yields hits wins:
//!
//! 1. **Article**: only when the query carries a section reference.
//! 2. **Semantic**: only when an embedder is configured and the snapshot
//!    has an embedding matrix. The query embedding runs under a timeout;
//!    failure or timeout falls through.
//! 3. **Lexical**: TF-IDF + keyword blend over the snapshot.
//! 4. **Keyword**: substring fallback, used when no snapshot exists yet.
//!
//! Without a snapshot, the article and keyword strategies read documents
//! straight from the [`DocumentSource`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::article::{article_number_of, detect_reference, ArticleLocator};
use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::index::{IndexedDocument, Snapshot};
use crate::keyword::keyword_search;
use crate::lexical::LexicalScorer;
use crate::models::{Retrieved, SearchMode};
use crate::normalize::QueryNormalizer;
use crate::semantic::SemanticScorer;
use crate::store::DocumentSource;

/// A normalized query, ready for scoring.
#[derive(Debug, Clone, Copy)]
pub struct RouteQuery<'a> {
    /// Raw query text, used for reference detection and embedding.
    pub text: &'a str,
    /// Normalized query tokens.
    pub tokens: &'a [String],
    /// Tokens plus learned synonyms; feeds only the TF-IDF query vector.
    pub expanded: &'a [String],
}

pub struct Router {
    documents: Arc<dyn DocumentSource>,
    normalizer: Arc<dyn QueryNormalizer>,
    embedder: Option<Arc<dyn Embedder>>,
    article: ArticleLocator,
    lexical: LexicalScorer,
    semantic: SemanticScorer,
    embed_timeout: Duration,
}

impl Router {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        normalizer: Arc<dyn QueryNormalizer>,
        embedder: Option<Arc<dyn Embedder>>,
        lexical: LexicalScorer,
        semantic: SemanticScorer,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            documents,
            normalizer,
            embedder,
            article: ArticleLocator,
            lexical,
            semantic,
            embed_timeout,
        }
    }

    /// Run one retrieval in the requested mode.
    pub async fn route(
        &self,
        query: RouteQuery<'_>,
        snapshot: Option<&Snapshot>,
        k: usize,
        mode: SearchMode,
    ) -> EngineResult<Retrieved> {
        match mode {
            SearchMode::Auto => self.cascade(query, snapshot, k).await,
            SearchMode::Article => self.article(query.text, snapshot, k).await,
            SearchMode::Keyword => self.keyword(query.tokens, snapshot, k).await,
            SearchMode::Tfidf => {
                let snapshot = snapshot.ok_or_else(|| EngineError::IndexUnavailable {
                    reason: "no index has been built yet; run a rebuild first".into(),
                })?;
                Ok(self
                    .lexical
                    .score(snapshot, query.tokens, query.expanded, k))
            }
            SearchMode::Semantic => {
                let (embedder, snapshot) = match (&self.embedder, snapshot) {
                    (Some(e), Some(s)) if s.embeddings().is_some() => (e.as_ref(), s),
                    (None, _) => {
                        return Err(EngineError::IndexUnavailable {
                            reason: "no embedding provider is configured".into(),
                        })
                    }
                    _ => {
                        return Err(EngineError::IndexUnavailable {
                            reason: "the current index has no embeddings".into(),
                        })
                    }
                };
                Ok(self.semantic(embedder, query.text, snapshot, k).await)
            }
        }
    }

    async fn cascade(
        &self,
        query: RouteQuery<'_>,
        snapshot: Option<&Snapshot>,
        k: usize,
    ) -> EngineResult<Retrieved> {
        if detect_reference(query.text).is_some() {
            let found = self.article(query.text, snapshot, k).await?;
            if !found.is_empty() {
                debug!(strategy = "article", hits = found.hits().len(), "cascade resolved");
                return Ok(found);
            }
            debug!("section reference matched nothing; continuing cascade");
        }

        let Some(snapshot) = snapshot else {
            debug!("no snapshot; using keyword fallback");
            return self.keyword(query.tokens, None, k).await;
        };

        if let (Some(embedder), Some(_)) = (&self.embedder, snapshot.embeddings()) {
            let found = self.semantic(embedder.as_ref(), query.text, snapshot, k).await;
            if !found.is_empty() {
                debug!(strategy = "semantic", hits = found.hits().len(), "cascade resolved");
                return Ok(found);
            }
        }

        let found = self
            .lexical
            .score(snapshot, query.tokens, query.expanded, k);
        debug!(strategy = "tfidf", hits = found.hits().len(), "cascade resolved");
        Ok(found)
    }

    async fn article(
        &self,
        text: &str,
        snapshot: Option<&Snapshot>,
        k: usize,
    ) -> EngineResult<Retrieved> {
        match snapshot {
            Some(s) => Ok(self.article.locate(
                text,
                s.documents().iter().map(|d| (&d.doc, d.article_number)),
                k,
            )),
            None => {
                let docs = self.documents.list_documents().await?;
                Ok(self
                    .article
                    .locate(text, docs.iter().map(|d| (d, article_number_of(d))), k))
            }
        }
    }

    async fn keyword(
        &self,
        tokens: &[String],
        snapshot: Option<&Snapshot>,
        k: usize,
    ) -> EngineResult<Retrieved> {
        match snapshot {
            Some(s) => Ok(keyword_search(
                tokens,
                s.documents()
                    .iter()
                    .map(|d| (&d.doc, d.search_text.as_str())),
                k,
            )),
            None => {
                let indexed: Vec<IndexedDocument> = self
                    .documents
                    .list_documents()
                    .await?
                    .into_iter()
                    .map(|doc| IndexedDocument::new(doc, self.normalizer.as_ref()).0)
                    .collect();
                Ok(keyword_search(
                    tokens,
                    indexed.iter().map(|d| (&d.doc, d.search_text.as_str())),
                    k,
                ))
            }
        }
    }

    /// Embed the query and score it. Provider errors and timeouts degrade
    /// to [`Retrieved::NoMatch`].
    async fn semantic(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        snapshot: &Snapshot,
        k: usize,
    ) -> Retrieved {
        let input = [text.to_string()];
        let embedded = match tokio::time::timeout(self.embed_timeout, embedder.embed(&input)).await
        {
            Ok(Ok(vectors)) => vectors,
            Ok(Err(e)) => {
                warn!(error = %e, model = embedder.model_name(), "query embedding failed; skipping semantic search");
                return Retrieved::NoMatch;
            }
            Err(_) => {
                let err = EngineError::ProviderTimeout {
                    after_ms: self.embed_timeout.as_millis() as u64,
                };
                warn!(error = %err, model = embedder.model_name(), "skipping semantic search");
                return Retrieved::NoMatch;
            }
        };

        match embedded.into_iter().next() {
            Some(query_vec) => self.semantic.score(snapshot, &query_vec, k),
            None => Retrieved::NoMatch,
        }
    }
}
