//! In-memory [`DocumentSource`] + [`LearningStore`] for tests and embedding.
//!
//! Uses `Vec` and `BTreeMap` behind `std::sync::RwLock`. Feedback takes the
//! interaction and pattern write locks together (always in that order), so
//! a promotion is never visible without its pattern.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Document, Interaction, Pattern, SynonymPair};

use super::{merge_pattern, DocumentSource, FeedbackUpdate, LearningStore};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<Vec<Document>>,
    interactions: RwLock<Vec<Interaction>>,
    patterns: RwLock<BTreeMap<String, Pattern>>,
    synonyms: RwLock<BTreeMap<(String, String), u64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::new();
        store.set_documents(documents);
        store
    }

    /// Replace the whole corpus.
    pub fn set_documents(&self, documents: Vec<Document>) {
        *write(&self.documents) = documents;
    }
}

#[async_trait]
impl DocumentSource for InMemoryStore {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(read(&self.documents).clone())
    }
}

#[async_trait]
impl LearningStore for InMemoryStore {
    async fn insert_interaction(&self, interaction: &Interaction) -> Result<()> {
        let mut interactions = write(&self.interactions);
        if interactions.iter().any(|i| i.id == interaction.id) {
            bail!("interaction {} already exists", interaction.id);
        }
        interactions.push(interaction.clone());
        Ok(())
    }

    async fn get_interaction(&self, id: &str) -> Result<Option<Interaction>> {
        Ok(read(&self.interactions).iter().find(|i| i.id == id).cloned())
    }

    async fn list_interactions(&self) -> Result<Vec<Interaction>> {
        Ok(read(&self.interactions).clone())
    }

    async fn record_feedback(&self, update: &FeedbackUpdate) -> Result<Option<Pattern>> {
        let mut interactions = write(&self.interactions);
        let mut patterns = write(&self.patterns);

        let Some(slot) = interactions
            .iter_mut()
            .find(|i| i.id == update.interaction.id)
        else {
            bail!("interaction {} not found", update.interaction.id);
        };
        *slot = update.interaction.clone();

        Ok(update.promote.as_ref().map(|incoming| {
            let merged = merge_pattern(patterns.remove(&incoming.signature), incoming);
            patterns.insert(merged.signature.clone(), merged.clone());
            merged
        }))
    }

    async fn get_pattern(&self, signature: &str) -> Result<Option<Pattern>> {
        Ok(read(&self.patterns).get(signature).cloned())
    }

    async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        Ok(read(&self.patterns).values().cloned().collect())
    }

    async fn bump_synonym_pair(&self, a: &str, b: &str) -> Result<u64> {
        let Some((a, b)) = SynonymPair::ordered(a, b) else {
            bail!("synonym pair needs two distinct terms, got '{}' twice", a);
        };
        let mut synonyms = write(&self.synonyms);
        let count = synonyms.entry((a.to_string(), b.to_string())).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn list_synonym_pairs(&self) -> Result<Vec<SynonymPair>> {
        Ok(read(&self.synonyms)
            .iter()
            .map(|((a, b), count)| SynonymPair {
                term_a: a.clone(),
                term_b: b.clone(),
                count: *count,
            })
            .collect())
    }
}
