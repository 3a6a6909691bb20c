//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to the engine
//! defaults. [`load_config`] validates ranges so that a bad file fails at
//! startup instead of mid-query.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lexrecall_core::engine::EngineParams;
use lexrecall_core::feedback::FeedbackParams;
use lexrecall_core::index::TfIdfParams;
use lexrecall_core::lexical::LexicalParams;
use lexrecall_core::normalize::{SimpleNormalizer, DEFAULT_STOP_WORDS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub tfidf_weight: f64,
    pub keyword_weight: f64,
    pub semantic_floor: f64,
    pub ngram_max: usize,
    pub min_df: usize,
    pub max_df: f64,
    pub expand_synonyms: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let lexical = LexicalParams::default();
        let tfidf = TfIdfParams::default();
        let params = EngineParams::default();
        Self {
            top_k: params.top_k,
            tfidf_weight: lexical.tfidf_weight,
            keyword_weight: lexical.keyword_weight,
            semantic_floor: params.semantic_floor,
            ngram_max: tfidf.ngram_max,
            min_df: tfidf.min_df,
            max_df: tfidf.max_df,
            expand_synonyms: params.expand_synonyms,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LearningConfig {
    pub match_threshold: f64,
    pub promote_min_rating: f64,
    pub positive_min_rating: u8,
    pub negative_max_rating: u8,
    pub synonym_min_count: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        let params = EngineParams::default();
        Self {
            match_threshold: params.match_threshold,
            promote_min_rating: params.feedback.promote_min_rating,
            positive_min_rating: params.feedback.positive_min_rating,
            negative_max_rating: params.feedback.negative_max_rating,
            synonym_min_count: params.synonym_min_count,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on the query-time embedding call.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_query_timeout_ms() -> u64 {
    3000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Stop words dropped from queries and documents. Defaults to the
    /// built-in Vietnamese list.
    pub stop_words: Option<Vec<String>>,
    pub min_token_chars: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            stop_words: None,
            min_token_chars: 1,
        }
    }
}

impl NormalizerConfig {
    pub fn build(&self) -> SimpleNormalizer {
        match &self.stop_words {
            Some(words) => SimpleNormalizer::new(words.iter().cloned(), self.min_token_chars),
            None => SimpleNormalizer::new(DEFAULT_STOP_WORDS.iter().copied(), self.min_token_chars),
        }
    }
}

impl Config {
    /// Map the file onto the engine's tunables.
    pub fn params(&self) -> EngineParams {
        let r = &self.retrieval;
        let l = &self.learning;
        EngineParams {
            top_k: r.top_k,
            lexical: LexicalParams {
                tfidf_weight: r.tfidf_weight,
                keyword_weight: r.keyword_weight,
            },
            semantic_floor: r.semantic_floor,
            match_threshold: l.match_threshold,
            feedback: FeedbackParams {
                promote_min_rating: l.promote_min_rating,
                positive_min_rating: l.positive_min_rating,
                negative_max_rating: l.negative_max_rating,
            },
            synonym_min_count: l.synonym_min_count,
            expand_synonyms: r.expand_synonyms,
            embed_timeout: Duration::from_millis(self.embedding.query_timeout_ms),
            embed_batch_size: self.embedding.batch_size,
            tfidf: TfIdfParams {
                ngram_max: r.ngram_max,
                min_df: r.min_df,
                max_df: r.max_df,
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    for (name, w) in [
        ("retrieval.tfidf_weight", r.tfidf_weight),
        ("retrieval.keyword_weight", r.keyword_weight),
    ] {
        if !(0.0..=1.0).contains(&w) {
            bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    let weight_sum = r.tfidf_weight + r.keyword_weight;
    if weight_sum <= 0.0 {
        bail!("retrieval.tfidf_weight and retrieval.keyword_weight cannot both be 0");
    }
    // lexical scores stay within [0, 1] only while the weights sum to at most 1
    if weight_sum > 1.0 + 1e-9 {
        bail!(
            "retrieval.tfidf_weight + retrieval.keyword_weight must not exceed 1.0 (got {})",
            weight_sum
        );
    }
    if !(0.0..=1.0).contains(&r.semantic_floor) {
        bail!("retrieval.semantic_floor must be in [0.0, 1.0]");
    }
    if r.ngram_max < 1 {
        bail!("retrieval.ngram_max must be >= 1");
    }
    if r.min_df < 1 {
        bail!("retrieval.min_df must be >= 1");
    }
    if !(r.max_df > 0.0 && r.max_df <= 1.0) {
        bail!("retrieval.max_df must be in (0.0, 1.0]");
    }

    let l = &config.learning;
    if !(0.0..1.0).contains(&l.match_threshold) {
        bail!("learning.match_threshold must be in [0.0, 1.0)");
    }
    if !(1.0..=5.0).contains(&l.promote_min_rating) {
        bail!("learning.promote_min_rating must be in [1, 5]");
    }
    if !(1..=5).contains(&l.positive_min_rating) || !(1..=5).contains(&l.negative_max_rating) {
        bail!("learning.positive_min_rating and learning.negative_max_rating must be in [1, 5]");
    }
    if l.negative_max_rating >= l.positive_min_rating {
        bail!("learning.negative_max_rating must be below learning.positive_min_rating");
    }
    if l.synonym_min_count < 1 {
        bail!("learning.synonym_min_count must be >= 1");
    }

    let e = &config.embedding;
    match e.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if e.is_enabled() && e.provider != "local" {
        if e.dims.is_none() || e.dims == Some(0) {
            bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
        }
        if e.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                e.provider
            );
        }
    }
    if e.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if e.query_timeout_ms == 0 {
        bail!("embedding.query_timeout_ms must be > 0");
    }

    Ok(())
}
