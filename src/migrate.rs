use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect and create the schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Corpus, in import order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT '',
            article_number INTEGER,
            text TEXT NOT NULL,
            url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            signature TEXT NOT NULL,
            tokens_json TEXT NOT NULL,
            answer TEXT NOT NULL,
            sources_json TEXT NOT NULL DEFAULT '[]',
            user_id TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            rating INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            promoted INTEGER NOT NULL DEFAULT 0,
            matched_signature TEXT,
            unanswered INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only rating history
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interaction_ratings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interaction_id TEXT NOT NULL,
            rating INTEGER NOT NULL,
            feedback TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (interaction_id) REFERENCES interactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            signature TEXT PRIMARY KEY,
            tokens_json TEXT NOT NULL,
            answer TEXT NOT NULL,
            interaction_id TEXT NOT NULL,
            usage_count INTEGER NOT NULL,
            rating_sum REAL NOT NULL,
            rating_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS synonym_pairs (
            term_a TEXT NOT NULL,
            term_b TEXT NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (term_a, term_b),
            CHECK (term_a < term_b)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_position ON documents(position)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interactions_created_at ON interactions(created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ratings_interaction ON interaction_ratings(interaction_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
