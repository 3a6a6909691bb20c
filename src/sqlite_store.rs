//! SQLite-backed [`DocumentSource`] and [`LearningStore`].
//!
//! Token lists and source ids are stored as JSON text; timestamps as Unix
//! milliseconds. Feedback is applied inside a single transaction so that a
//! crash never leaves a rating without its pattern merge.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lexrecall_core::models::{
    Document, Interaction, InteractionStatus, Pattern, RatingEntry, SynonymPair,
};
use lexrecall_core::store::{DocumentSource, FeedbackUpdate, LearningStore};

/// SQLite implementation of the engine's storage traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the whole corpus with `docs`, keeping their order.
    pub async fn replace_documents(&self, docs: &[Document]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        for (position, doc) in docs.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO documents (id, position, title, section, article_number, text, url)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(position as i64)
            .bind(&doc.title)
            .bind(&doc.section)
            .bind(doc.article_number.map(i64::from))
            .bind(&doc.text)
            .bind(&doc.url)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert document {}", doc.id))?;
        }
        tx.commit().await?;
        Ok(docs.len())
    }

    /// Insert new documents at the end of the corpus and update existing
    /// ones in place.
    pub async fn upsert_documents(&self, docs: &[Document]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            sqlx::query(
                r#"
                INSERT INTO documents (id, position, title, section, article_number, text, url)
                VALUES (?, (SELECT COALESCE(MAX(position), -1) + 1 FROM documents), ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    section = excluded.section,
                    article_number = excluded.article_number,
                    text = excluded.text,
                    url = excluded.url
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.title)
            .bind(&doc.section)
            .bind(doc.article_number.map(i64::from))
            .bind(&doc.text)
            .bind(&doc.url)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to upsert document {}", doc.id))?;
        }
        tx.commit().await?;
        Ok(docs.len())
    }

    pub async fn document_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ratings_by_interaction(
        &self,
        interaction_id: Option<&str>,
    ) -> Result<HashMap<String, Vec<RatingEntry>>> {
        let rows = match interaction_id {
            Some(id) => {
                sqlx::query(
                    "SELECT interaction_id, rating, feedback, created_at FROM interaction_ratings \
                     WHERE interaction_id = ? ORDER BY id",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT interaction_id, rating, feedback, created_at FROM interaction_ratings \
                     ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut grouped: HashMap<String, Vec<RatingEntry>> = HashMap::new();
        for row in rows {
            let id: String = row.try_get("interaction_id")?;
            let entry = RatingEntry {
                rating: rating_from_db(row.try_get("rating")?)?,
                feedback: row.try_get("feedback")?,
                at: from_millis(row.try_get("created_at")?)?,
            };
            grouped.entry(id).or_default().push(entry);
        }
        Ok(grouped)
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

fn rating_from_db(value: i64) -> Result<u8> {
    u8::try_from(value).map_err(|_| anyhow!("stored rating out of range: {}", value))
}

fn count_from_db(value: i64) -> u64 {
    value.max(0) as u64
}

fn string_list(json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).with_context(|| format!("malformed JSON list: {}", json))
}

const INTERACTION_COLUMNS: &str = "id, query, signature, tokens_json, answer, sources_json, \
     user_id, created_at, rating, status, promoted, matched_signature, unanswered";

fn interaction_from_row(row: &SqliteRow, ratings: Vec<RatingEntry>) -> Result<Interaction> {
    let status: String = row.try_get("status")?;
    let rating: Option<i64> = row.try_get("rating")?;
    let tokens: String = row.try_get("tokens_json")?;
    let sources: String = row.try_get("sources_json")?;
    let promoted: i64 = row.try_get("promoted")?;
    let unanswered: i64 = row.try_get("unanswered")?;

    Ok(Interaction {
        id: row.try_get("id")?,
        query: row.try_get("query")?,
        signature: row.try_get("signature")?,
        tokens: string_list(&tokens)?,
        answer: row.try_get("answer")?,
        sources: string_list(&sources)?,
        user_id: row.try_get("user_id")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        ratings,
        rating: rating.map(rating_from_db).transpose()?,
        status: InteractionStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown interaction status: {}", status))?,
        promoted: promoted != 0,
        matched_signature: row.try_get("matched_signature")?,
        unanswered: unanswered != 0,
    })
}

const PATTERN_COLUMNS: &str = "signature, tokens_json, answer, interaction_id, usage_count, \
     rating_sum, rating_count, created_at, updated_at";

fn pattern_from_row(row: &SqliteRow) -> Result<Pattern> {
    let tokens: String = row.try_get("tokens_json")?;
    Ok(Pattern {
        signature: row.try_get("signature")?,
        tokens: string_list(&tokens)?,
        answer: row.try_get("answer")?,
        interaction_id: row.try_get("interaction_id")?,
        usage_count: count_from_db(row.try_get("usage_count")?),
        rating_sum: row.try_get("rating_sum")?,
        rating_count: count_from_db(row.try_get("rating_count")?),
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

#[async_trait]
impl DocumentSource for SqliteStore {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, title, section, article_number, text, url FROM documents ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Document> {
                let article: Option<i64> = row.try_get("article_number")?;
                Ok(Document {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    section: row.try_get("section")?,
                    article_number: article.and_then(|n| u32::try_from(n).ok()),
                    text: row.try_get("text")?,
                    url: row.try_get("url")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LearningStore for SqliteStore {
    async fn insert_interaction(&self, interaction: &Interaction) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO interactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            INTERACTION_COLUMNS
        ))
        .bind(&interaction.id)
        .bind(&interaction.query)
        .bind(&interaction.signature)
        .bind(serde_json::to_string(&interaction.tokens)?)
        .bind(&interaction.answer)
        .bind(serde_json::to_string(&interaction.sources)?)
        .bind(&interaction.user_id)
        .bind(to_millis(interaction.created_at))
        .bind(interaction.rating.map(i64::from))
        .bind(interaction.status.as_str())
        .bind(interaction.promoted as i64)
        .bind(&interaction.matched_signature)
        .bind(interaction.unanswered as i64)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert interaction {}", interaction.id))?;

        for entry in &interaction.ratings {
            sqlx::query(
                "INSERT INTO interaction_ratings (interaction_id, rating, feedback, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&interaction.id)
            .bind(i64::from(entry.rating))
            .bind(&entry.feedback)
            .bind(to_millis(entry.at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_interaction(&self, id: &str) -> Result<Option<Interaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM interactions WHERE id = ?",
            INTERACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut ratings = self.ratings_by_interaction(Some(id)).await?;
        let history = ratings.remove(id).unwrap_or_default();
        interaction_from_row(&row, history).map(Some)
    }

    async fn list_interactions(&self) -> Result<Vec<Interaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM interactions ORDER BY created_at, rowid",
            INTERACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut ratings = self.ratings_by_interaction(None).await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let history = ratings.remove(&id).unwrap_or_default();
                interaction_from_row(row, history)
            })
            .collect()
    }

    async fn record_feedback(&self, update: &FeedbackUpdate) -> Result<Option<Pattern>> {
        let interaction = &update.interaction;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE interactions
            SET rating = ?, status = ?, promoted = ?, matched_signature = ?
            WHERE id = ?
            "#,
        )
        .bind(interaction.rating.map(i64::from))
        .bind(interaction.status.as_str())
        .bind(interaction.promoted as i64)
        .bind(&interaction.matched_signature)
        .bind(&interaction.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            bail!("interaction {} not found", interaction.id);
        }

        sqlx::query(
            "INSERT INTO interaction_ratings (interaction_id, rating, feedback, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&interaction.id)
        .bind(i64::from(update.entry.rating))
        .bind(&update.entry.feedback)
        .bind(to_millis(update.entry.at))
        .execute(&mut *tx)
        .await?;

        let stored = match &update.promote {
            None => None,
            Some(pattern) => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO patterns ({})
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(signature) DO UPDATE SET
                        usage_count = patterns.usage_count + excluded.usage_count,
                        rating_sum = patterns.rating_sum + excluded.rating_sum,
                        rating_count = patterns.rating_count + excluded.rating_count,
                        updated_at = excluded.updated_at
                    "#,
                    PATTERN_COLUMNS
                ))
                .bind(&pattern.signature)
                .bind(serde_json::to_string(&pattern.tokens)?)
                .bind(&pattern.answer)
                .bind(&pattern.interaction_id)
                .bind(pattern.usage_count as i64)
                .bind(pattern.rating_sum)
                .bind(pattern.rating_count as i64)
                .bind(to_millis(pattern.created_at))
                .bind(to_millis(pattern.updated_at))
                .execute(&mut *tx)
                .await?;

                let row = sqlx::query(&format!(
                    "SELECT {} FROM patterns WHERE signature = ?",
                    PATTERN_COLUMNS
                ))
                .bind(&pattern.signature)
                .fetch_one(&mut *tx)
                .await?;
                Some(pattern_from_row(&row)?)
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    async fn get_pattern(&self, signature: &str) -> Result<Option<Pattern>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM patterns WHERE signature = ?",
            PATTERN_COLUMNS
        ))
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(pattern_from_row).transpose()
    }

    async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM patterns ORDER BY signature",
            PATTERN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pattern_from_row).collect()
    }

    async fn bump_synonym_pair(&self, a: &str, b: &str) -> Result<u64> {
        let Some((a, b)) = SynonymPair::ordered(a, b) else {
            bail!("synonym pair needs two distinct terms, got '{}' twice", a);
        };

        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO synonym_pairs (term_a, term_b, count) VALUES (?, ?, 1)
            ON CONFLICT(term_a, term_b) DO UPDATE SET count = synonym_pairs.count + 1
            RETURNING count
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;

        Ok(count_from_db(count))
    }

    async fn list_synonym_pairs(&self) -> Result<Vec<SynonymPair>> {
        let rows =
            sqlx::query("SELECT term_a, term_b, count FROM synonym_pairs ORDER BY term_a, term_b")
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|row| -> Result<SynonymPair> {
                Ok(SynonymPair {
                    term_a: row.try_get("term_a")?,
                    term_b: row.try_get("term_b")?,
                    count: count_from_db(row.try_get("count")?),
                })
            })
            .collect()
    }
}
