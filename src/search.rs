//! `lexr search`: run the retrieval cascade and print ranked passages.

use anyhow::Result;

use lexrecall_core::confidence::{estimate, ConfidenceLevel};
use lexrecall_core::models::{Hit, Retrieved, SearchMode};

use crate::app;
use crate::config::Config;

const EXCERPT_CHARS: usize = 240;

/// First `max` characters of `text` on one line, with an ellipsis when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

fn print_hit(rank: usize, hit: &Hit) {
    let heading = if hit.section.is_empty() {
        hit.title.clone()
    } else {
        format!("{} / {}", hit.title, hit.section)
    };
    println!("{}. [{:.2}] {}", rank, hit.score, heading);
    println!("    excerpt: \"{}\"", excerpt(&hit.text, EXCERPT_CHARS));
    if let Some(url) = &hit.url {
        println!("    url: {}", url);
    }
    println!("    id: {}", hit.doc_id);
    println!();
}

/// Print a retrieval result. Shared with `lexr ask`.
pub fn print_retrieved(result: &Retrieved) {
    let Retrieved::Hits { strategy, hits } = result else {
        println!("No results.");
        return;
    };
    let confidence = estimate(result);
    println!(
        "strategy: {} (confidence {:.2}, {})",
        strategy,
        confidence,
        ConfidenceLevel::from_score(confidence)
    );
    println!();
    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
}

pub async fn run_search(
    config: &Config,
    query: &str,
    mode: &str,
    limit: Option<usize>,
) -> Result<()> {
    let mode: SearchMode = mode.parse()?;
    let app = app::open_indexed(config).await?;

    let result = app.engine.retrieve(query, limit, mode).await;
    app.close().await;

    print_retrieved(&result.map_err(app::engine_error)?);
    Ok(())
}
