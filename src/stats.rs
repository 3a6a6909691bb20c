//! Learning statistics: `lexr stats`, `lexr top`, and `lexr synonyms`.

use anyhow::Result;

use crate::app;
use crate::config::Config;

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let app = app::open(config).await?;
    let documents = app.store.document_count().await;
    let stats = app.engine.learning_stats().await;
    app.close().await;

    let documents = documents?;
    let stats = stats.map_err(app::engine_error)?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("lexrecall: learning stats");
    println!("=========================");
    println!();
    println!("  Database:               {}", config.db.path.display());
    println!("  Size:                   {}", format_bytes(db_size));
    println!("  Documents:              {}", documents);
    println!();
    println!("  Interactions:           {}", stats.total_interactions);
    println!("  With feedback:          {}", stats.interactions_with_feedback);
    println!("  Positive feedback:      {}", stats.positive_feedback);
    println!("  Negative feedback:      {}", stats.negative_feedback);
    println!("  Average rating:         {:.2}", stats.avg_rating);
    println!("  Patterns learned:       {}", stats.total_patterns_learned);
    println!("  Synonym pairs:          {}", stats.total_synonym_pairs);
    Ok(())
}

pub async fn run_top(config: &Config, limit: usize) -> Result<()> {
    let app = app::open(config).await?;
    let top = app.engine.top_questions(limit).await;
    app.close().await;

    let top = top.map_err(app::engine_error)?;
    if top.is_empty() {
        println!("No questions recorded.");
        return Ok(());
    }
    for (i, q) in top.iter().enumerate() {
        println!(
            "{}. [{}x, avg {:.1}] {}",
            i + 1,
            q.count,
            q.avg_rating,
            q.question
        );
    }
    Ok(())
}

pub async fn run_synonyms(config: &Config, term: &str) -> Result<()> {
    let app = app::open(config).await?;
    let synonyms = app.engine.synonyms(term).await;
    app.close().await;

    let synonyms = synonyms.map_err(app::engine_error)?;
    if synonyms.is_empty() {
        println!("No synonyms learned for \"{}\".", term);
    } else {
        for s in synonyms {
            println!("{}", s);
        }
    }
    Ok(())
}
