//! Corpus snapshots: TF-IDF matrix, optional embedding matrix, and the
//! atomically swappable cell that serves them.
//!
//! # TF-IDF
//!
//! 1. Terms are the normalized unigrams plus n-grams up to `ngram_max`.
//! 2. `tf` is the raw term count in a document.
//! 3. `idf = ln((1 + n) / (1 + df)) + 1`, so every surviving term keeps a
//!    positive weight even when it occurs in every document.
//! 4. Terms with `df < min_df` or `df > max_df × n` are pruned.
//! 5. Rows are L2-normalized, so a dot product is a cosine.
//!
//! Term ids follow first-seen corpus order, which makes a rebuild over an
//! unchanged corpus produce identical rows.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::article::article_number_of;
use crate::embedding::Embedder;
use crate::models::Document;
use crate::normalize::QueryNormalizer;

/// Sparse vector as `(term_id, weight)` pairs sorted by term id.
pub type SparseVec = Vec<(u32, f64)>;

/// TF-IDF tuning parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TfIdfParams {
    /// Largest n-gram length (1 = unigrams only).
    pub ngram_max: usize,
    /// Minimum number of documents a term must occur in.
    pub min_df: usize,
    /// Maximum fraction of documents a term may occur in.
    pub max_df: f64,
}

impl Default for TfIdfParams {
    fn default() -> Self {
        Self {
            ngram_max: 2,
            min_df: 1,
            max_df: 1.0,
        }
    }
}

/// Expand a token sequence into unigram + n-gram terms.
pub fn ngram_terms(tokens: &[String], ngram_max: usize) -> Vec<String> {
    let mut terms: Vec<String> = tokens.to_vec();
    for n in 2..=ngram_max.max(1) {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            terms.push(window.join(" "));
        }
    }
    terms
}

/// Dot product of two sparse vectors sorted by term id.
pub fn sparse_dot(a: &[(u32, f64)], b: &[(u32, f64)]) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

fn l2_normalize(v: &mut SparseVec) {
    let norm = v.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        for (_, w) in v.iter_mut() {
            *w /= norm;
        }
    }
}

/// Fitted TF-IDF vocabulary and document rows.
#[derive(Debug, Clone, Default)]
pub struct TfIdfMatrix {
    vocab: HashMap<String, u32>,
    idf: Vec<f64>,
    rows: Vec<SparseVec>,
    ngram_max: usize,
}

impl TfIdfMatrix {
    /// Fit on one token sequence per document.
    pub fn fit(token_seqs: &[Vec<String>], params: &TfIdfParams) -> Self {
        let n_docs = token_seqs.len();
        let mut first_seen: Vec<String> = Vec::new();
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut doc_counts: Vec<Vec<(String, usize)>> = Vec::with_capacity(n_docs);

        for tokens in token_seqs {
            let mut order: Vec<String> = Vec::new();
            let mut counts: HashMap<String, usize> = HashMap::new();
            for term in ngram_terms(tokens, params.ngram_max) {
                let count = counts.entry(term.clone()).or_insert(0);
                if *count == 0 {
                    order.push(term.clone());
                    let seen = df.entry(term.clone()).or_insert(0);
                    if *seen == 0 {
                        first_seen.push(term);
                    }
                    *seen += 1;
                }
                *count += 1;
            }
            doc_counts.push(
                order
                    .into_iter()
                    .map(|t| {
                        let c = counts.get(&t).copied().unwrap_or(0);
                        (t, c)
                    })
                    .collect(),
            );
        }

        let max_doc_count = params.max_df * n_docs as f64;
        let mut vocab: HashMap<String, u32> = HashMap::new();
        let mut idf: Vec<f64> = Vec::new();
        for term in first_seen {
            let term_df = df.get(&term).copied().unwrap_or(0);
            if term_df < params.min_df || term_df as f64 > max_doc_count {
                continue;
            }
            let id = idf.len() as u32;
            idf.push(((1.0 + n_docs as f64) / (1.0 + term_df as f64)).ln() + 1.0);
            vocab.insert(term, id);
        }

        let rows = doc_counts
            .iter()
            .map(|counts| {
                let mut row: SparseVec = counts
                    .iter()
                    .filter_map(|(term, count)| {
                        vocab
                            .get(term)
                            .map(|&id| (id, *count as f64 * idf[id as usize]))
                    })
                    .collect();
                row.sort_by_key(|(id, _)| *id);
                l2_normalize(&mut row);
                row
            })
            .collect();

        debug!(docs = n_docs, terms = idf.len(), "fitted tf-idf matrix");

        Self {
            vocab,
            idf,
            rows,
            ngram_max: params.ngram_max,
        }
    }

    /// Project a query token sequence into the fitted vocabulary.
    /// Unknown terms are ignored.
    pub fn transform(&self, tokens: &[String]) -> SparseVec {
        let mut counts: HashMap<u32, f64> = HashMap::new();
        for term in ngram_terms(tokens, self.ngram_max) {
            if let Some(&id) = self.vocab.get(&term) {
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
        }
        let mut v: SparseVec = counts
            .into_iter()
            .map(|(id, tf)| (id, tf * self.idf[id as usize]))
            .collect();
        v.sort_by_key(|(id, _)| *id);
        l2_normalize(&mut v);
        v
    }

    pub fn rows(&self) -> &[SparseVec] {
        &self.rows
    }

    pub fn vocab_len(&self) -> usize {
        self.idf.len()
    }
}

/// A document together with everything the scorers derive from it.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub doc: Document,
    /// Unigram token set of the document text.
    pub tokens: HashSet<String>,
    /// Article number, falling back to one parsed from the section label.
    pub article_number: Option<u32>,
    /// Normalized title + section + text, for substring matching.
    pub search_text: String,
}

impl IndexedDocument {
    pub fn new(doc: Document, normalizer: &dyn QueryNormalizer) -> (Self, Vec<String>) {
        let text_tokens = normalizer.normalize(&doc.text);
        let search_text = normalizer
            .normalize(&format!("{} {} {}", doc.title, doc.section, doc.text))
            .join(" ");
        let indexed = Self {
            article_number: article_number_of(&doc),
            tokens: text_tokens.iter().cloned().collect(),
            search_text,
            doc,
        };
        (indexed, text_tokens)
    }
}

/// Immutable view of the indexed corpus.
///
/// Invariant: `documents.len() == tfidf.rows().len()`, and the embedding
/// matrix, when present, has the same number of rows.
#[derive(Debug, Clone)]
pub struct Snapshot {
    documents: Vec<IndexedDocument>,
    tfidf: TfIdfMatrix,
    embeddings: Option<Vec<Vec<f32>>>,
    embedding_model: Option<String>,
    fingerprint: String,
    built_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn documents(&self) -> &[IndexedDocument] {
        &self.documents
    }

    pub fn tfidf(&self) -> &TfIdfMatrix {
        &self.tfidf
    }

    pub fn embeddings(&self) -> Option<&[Vec<f32>]> {
        self.embeddings.as_deref()
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// SHA-256 over the indexed documents, in order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Builds snapshots from a document list.
pub struct Indexer {
    normalizer: Arc<dyn QueryNormalizer>,
    params: TfIdfParams,
}

impl Indexer {
    pub fn new(normalizer: Arc<dyn QueryNormalizer>, params: TfIdfParams) -> Self {
        Self { normalizer, params }
    }

    /// Build a lexical-only snapshot. An empty corpus yields an empty,
    /// valid snapshot.
    pub fn build(&self, documents: Vec<Document>) -> Snapshot {
        self.build_with_embeddings(documents, None, None)
    }

    /// Build a snapshot, attaching a precomputed embedding matrix.
    ///
    /// An embedding matrix whose row count does not match the corpus is
    /// dropped rather than attached.
    pub fn build_with_embeddings(
        &self,
        documents: Vec<Document>,
        embeddings: Option<Vec<Vec<f32>>>,
        embedding_model: Option<String>,
    ) -> Snapshot {
        let fingerprint = fingerprint(&documents);

        let mut indexed = Vec::with_capacity(documents.len());
        let mut token_seqs = Vec::with_capacity(documents.len());
        for doc in documents {
            let (doc, tokens) = IndexedDocument::new(doc, self.normalizer.as_ref());
            indexed.push(doc);
            token_seqs.push(tokens);
        }

        let tfidf = TfIdfMatrix::fit(&token_seqs, &self.params);

        let embeddings = match embeddings {
            Some(rows) if rows.len() == indexed.len() => Some(rows),
            Some(rows) => {
                warn!(
                    expected = indexed.len(),
                    got = rows.len(),
                    "embedding matrix does not match corpus; semantic search disabled for this snapshot"
                );
                None
            }
            None => None,
        };
        let embedding_model = embeddings.as_ref().and(embedding_model);

        Snapshot {
            documents: indexed,
            tfidf,
            embeddings,
            embedding_model,
            fingerprint,
            built_at: Utc::now(),
        }
    }
}

/// Embed every document text in batches of `batch_size`.
pub async fn embed_documents(
    embedder: &dyn Embedder,
    documents: &[Document],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(documents.len());
    for batch in documents.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;
        if embedded.len() != texts.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            );
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

fn fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        for field in [
            doc.id.as_str(),
            doc.title.as_str(),
            doc.section.as_str(),
            doc.text.as_str(),
            doc.url.as_deref().unwrap_or(""),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(doc.article_number.map(|n| n.to_string()).unwrap_or_default());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Holds the current snapshot. Readers clone the `Arc` and never observe a
/// partially built snapshot.
#[derive(Default)]
pub struct SnapshotCell {
    inner: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<Snapshot>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a fully built snapshot, returning the one it replaced.
    pub fn swap(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let next = Arc::new(snapshot);
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::SimpleNormalizer;

    fn doc(id: &str, section: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            title: "Luật Đất đai".to_string(),
            section: section.to_string(),
            article_number: None,
            text: text.to_string(),
            url: None,
        }
    }

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    fn indexer() -> Indexer {
        Indexer::new(Arc::new(SimpleNormalizer::plain()), TfIdfParams::default())
    }

    #[test]
    fn test_ngram_terms() {
        let t = tokens(&["a", "b", "c"]);
        assert_eq!(ngram_terms(&t, 1), tokens(&["a", "b", "c"]));
        assert_eq!(ngram_terms(&t, 2), tokens(&["a", "b", "c", "a b", "b c"]));
        assert_eq!(ngram_terms(&tokens(&["a"]), 3), tokens(&["a"]));
    }

    #[test]
    fn test_sparse_dot() {
        let a = vec![(0, 1.0), (2, 2.0), (5, 1.0)];
        let b = vec![(1, 3.0), (2, 4.0), (5, 0.5)];
        assert!((sparse_dot(&a, &b) - 8.5).abs() < 1e-12);
        assert_eq!(sparse_dot(&a, &[]), 0.0);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let seqs = vec![tokens(&["đất", "đai", "đất"]), tokens(&["bồi", "thường"])];
        let m = TfIdfMatrix::fit(&seqs, &TfIdfParams::default());
        assert_eq!(m.rows().len(), 2);
        for row in m.rows() {
            let norm: f64 = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let seqs = vec![
            tokens(&["đất", "bồi"]),
            tokens(&["đất", "thuế"]),
            tokens(&["đất", "thuê"]),
        ];
        let params = TfIdfParams {
            ngram_max: 1,
            ..TfIdfParams::default()
        };
        let m = TfIdfMatrix::fit(&seqs, &params);
        let row = &m.rows()[0];
        // term 0 = "đất" (df 3), term 1 = "bồi" (df 1)
        assert_eq!(row[0].0, 0);
        assert_eq!(row[1].0, 1);
        assert!(row[1].1 > row[0].1);
    }

    #[test]
    fn test_max_df_prunes_ubiquitous_terms() {
        let seqs = vec![tokens(&["đất", "bồi"]), tokens(&["đất", "thuế"])];
        let params = TfIdfParams {
            ngram_max: 1,
            min_df: 1,
            max_df: 0.5,
        };
        let m = TfIdfMatrix::fit(&seqs, &params);
        assert_eq!(m.vocab_len(), 2);
        assert!(m.transform(&tokens(&["đất"])).is_empty());
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let m = TfIdfMatrix::fit(&[tokens(&["đất"])], &TfIdfParams::default());
        assert!(m.transform(&tokens(&["xyz"])).is_empty());
        let q = m.transform(&tokens(&["đất", "xyz"]));
        assert_eq!(q.len(), 1);
        assert!((q[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_corpus_builds_valid_snapshot() {
        let snap = indexer().build(Vec::new());
        assert!(snap.is_empty());
        assert_eq!(snap.tfidf().rows().len(), 0);
        assert!(snap.embeddings().is_none());
    }

    #[test]
    fn test_article_number_derived_from_section() {
        let snap = indexer().build(vec![doc("d1", "Điều 69", "bồi thường đất")]);
        assert_eq!(snap.documents()[0].article_number, Some(69));
        assert_eq!(snap.documents().len(), snap.tfidf().rows().len());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let docs = vec![
            doc("d1", "Điều 1", "quyền sử dụng đất"),
            doc("d2", "Điều 2", "nghĩa vụ của người sử dụng đất"),
        ];
        let a = indexer().build(docs.clone());
        let b = indexer().build(docs);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.tfidf().rows(), b.tfidf().rows());
    }

    #[test]
    fn test_mismatched_embeddings_are_dropped() {
        let snap = indexer().build_with_embeddings(
            vec![doc("d1", "", "a"), doc("d2", "", "b")],
            Some(vec![vec![1.0, 0.0]]),
            Some("test".into()),
        );
        assert!(snap.embeddings().is_none());
        assert!(snap.embedding_model().is_none());
    }

    #[test]
    fn test_cell_swap_replaces_whole_snapshot() {
        let cell = SnapshotCell::new();
        assert!(cell.load().is_none());

        let first = indexer().build(vec![doc("d1", "", "a")]);
        assert!(cell.swap(first).is_none());
        let held = cell.load().unwrap();

        let second = indexer().build(vec![doc("d1", "", "a"), doc("d2", "", "b")]);
        let previous = cell.swap(second).unwrap();

        assert_eq!(previous.len(), 1);
        assert_eq!(held.len(), 1);
        assert_eq!(cell.load().unwrap().len(), 2);
    }
}
