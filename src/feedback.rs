//! `lexr feedback`: rate a recorded interaction.

use anyhow::Result;

use crate::app;
use crate::config::Config;

pub async fn run_feedback(
    config: &Config,
    interaction_id: &str,
    rating: i64,
    text: Option<String>,
) -> Result<()> {
    let app = app::open(config).await?;
    let result = app.engine.submit_feedback(interaction_id, rating, text).await;
    app.close().await;

    let outcome = result.map_err(app::engine_error)?;
    println!(
        "Recorded rating {} for {} (status: {}, average: {:.1})",
        outcome.rating,
        outcome.interaction_id,
        outcome.status.as_str(),
        outcome.average_rating
    );
    if let Some(pattern) = &outcome.promoted {
        println!(
            "Promoted to pattern \"{}\" (used {} times, avg rating {:.1})",
            pattern.signature,
            pattern.usage_count,
            pattern.average_rating()
        );
    }
    if outcome.synonym_pairs_bumped > 0 {
        println!("Updated {} synonym pairs", outcome.synonym_pairs_bumped);
    }
    Ok(())
}
