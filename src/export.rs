//! `lexr export`: dump learned data as JSON.
//!
//! With `--out <dir>` three files are written:
//!
//! | File | Content |
//! |------|---------|
//! | `high_quality_qa.json` | Interactions rated at or above the positive threshold |
//! | `patterns.json` | All learned patterns |
//! | `stats.json` | Learning statistics |
//!
//! Without `--out`, the same data is printed to stdout as one JSON object.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use lexrecall_core::models::{Interaction, LearningStats, Pattern};
use lexrecall_core::store::LearningStore;

use crate::app;
use crate::config::Config;

#[derive(Debug, Serialize, PartialEq)]
pub struct QaPair {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub rating: u8,
    pub feedback: Option<String>,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ExportData<'a> {
    high_quality_qa: &'a [QaPair],
    patterns: &'a [Pattern],
    stats: &'a LearningStats,
}

/// Answered interactions whose effective rating is at least `min_rating`,
/// with the most recent written feedback attached.
pub fn high_quality_pairs(interactions: &[Interaction], min_rating: u8) -> Vec<QaPair> {
    interactions
        .iter()
        .filter(|i| !i.unanswered)
        .filter_map(|i| {
            let rating = i.rating.filter(|&r| r >= min_rating)?;
            Some(QaPair {
                id: i.id.clone(),
                question: i.query.clone(),
                answer: i.answer.clone(),
                rating,
                feedback: i.ratings.iter().rev().find_map(|e| e.feedback.clone()),
                sources: i.sources.clone(),
                created_at: i.created_at,
            })
        })
        .collect()
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub async fn run_export(config: &Config, out: Option<&Path>) -> Result<()> {
    let app = app::open(config).await?;
    let loaded = async {
        let interactions = app.store.list_interactions().await?;
        let patterns = app.store.list_patterns().await?;
        let stats = app.engine.learning_stats().await.map_err(app::engine_error)?;
        anyhow::Ok((interactions, patterns, stats))
    }
    .await;
    app.close().await;

    let (interactions, patterns, stats) = loaded?;
    let qa = high_quality_pairs(&interactions, config.learning.positive_min_rating);

    match out {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            write_json(dir, "high_quality_qa.json", &qa)?;
            write_json(dir, "patterns.json", &patterns)?;
            write_json(dir, "stats.json", &stats)?;
            eprintln!(
                "Exported {} Q&A pairs, {} patterns to {}",
                qa.len(),
                patterns.len(),
                dir.display()
            );
        }
        None => {
            let data = ExportData {
                high_quality_qa: &qa,
                patterns: &patterns,
                stats: &stats,
            };
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexrecall_core::models::{InteractionStatus, RatingEntry};

    fn interaction(id: &str, ratings: &[(u8, Option<&str>)]) -> Interaction {
        let now = Utc::now();
        Interaction {
            id: id.to_string(),
            query: format!("question {}", id),
            signature: format!("question {}", id),
            tokens: vec!["question".to_string(), id.to_string()],
            answer: "answer".to_string(),
            sources: vec!["d1".to_string()],
            user_id: String::new(),
            created_at: now,
            ratings: ratings
                .iter()
                .map(|(r, f)| RatingEntry {
                    rating: *r,
                    feedback: f.map(str::to_string),
                    at: now,
                })
                .collect(),
            rating: ratings.last().map(|(r, _)| *r),
            status: InteractionStatus::Pending,
            promoted: false,
            matched_signature: None,
            unanswered: false,
        }
    }

    #[test]
    fn test_high_quality_uses_effective_rating() {
        let mut miss = interaction("d", &[(5, None)]);
        miss.unanswered = true;
        let interactions = vec![
            interaction("a", &[(5, Some("rõ ràng")), (4, None)]),
            interaction("b", &[(5, None), (2, Some("sai"))]),
            interaction("c", &[]),
            miss,
        ];
        let qa = high_quality_pairs(&interactions, 4);
        assert_eq!(qa.len(), 1);
        assert_eq!(qa[0].id, "a");
        assert_eq!(qa[0].rating, 4);
        assert_eq!(qa[0].feedback.as_deref(), Some("rõ ràng"));
    }
}
