//! `lexr ask`: answer a question and record the exchange for feedback.
//!
//! A learned answer wins when one matches; otherwise the top retrieved
//! passage is the answer. Either way the interaction is stored and its id
//! printed so it can be rated with `lexr feedback`.

use anyhow::Result;

use lexrecall_core::confidence::{estimate, estimate_learned, ConfidenceLevel};
use lexrecall_core::models::{LearnedOrigin, NewInteraction, Retrieved, SearchMode};

use crate::app;
use crate::config::Config;

/// Answer recorded when nothing in the corpus matches.
pub const NO_ANSWER: &str = "Không tìm thấy thông tin phù hợp trong cơ sở dữ liệu pháp luật.";

/// What `ask` decided to answer, before it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub origin: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub matched_signature: Option<String>,
    /// Nothing in the corpus matched; the text is [`NO_ANSWER`].
    pub unanswered: bool,
}

/// Compose an answer from a retrieval result.
pub fn answer_from_retrieved(result: &Retrieved) -> Answer {
    let confidence = estimate(result);
    let (Some(strategy), Some(top)) = (result.strategy(), result.hits().first()) else {
        return Answer {
            text: NO_ANSWER.to_string(),
            origin: "none".to_string(),
            confidence,
            sources: Vec::new(),
            matched_signature: None,
            unanswered: true,
        };
    };
    let heading = if top.section.is_empty() {
        top.title.clone()
    } else {
        format!("{}, {}", top.title, top.section)
    };
    Answer {
        text: format!("{}\n{}", heading, top.text.trim()),
        origin: strategy.to_string(),
        confidence,
        sources: result.hits().iter().map(|h| h.doc_id.clone()).collect(),
        matched_signature: None,
        unanswered: false,
    }
}

pub async fn run_ask(config: &Config, question: &str, user: &str) -> Result<()> {
    let app = app::open_indexed(config).await?;
    let result = answer(&app, question, user).await;
    app.close().await;

    let (id, answer) = result?;
    println!("{}", answer.text);
    println!();
    println!(
        "confidence: {:.2} ({})",
        answer.confidence,
        ConfidenceLevel::from_score(answer.confidence)
    );
    println!("source: {}", answer.origin);
    println!("interaction: {}", id);
    Ok(())
}

async fn answer(app: &app::App, question: &str, user: &str) -> Result<(String, Answer)> {
    let engine = &app.engine;

    let answer = match engine
        .find_learned_answer(question)
        .await
        .map_err(app::engine_error)?
    {
        Some(learned) => Answer {
            confidence: estimate_learned(&learned),
            origin: match learned.origin {
                LearnedOrigin::Pattern => "learned-pattern".to_string(),
                LearnedOrigin::Interaction => "learned-interaction".to_string(),
            },
            text: learned.answer,
            sources: vec![learned.interaction_id],
            matched_signature: Some(learned.signature),
            unanswered: false,
        },
        None => {
            let retrieved = engine
                .retrieve(question, None, SearchMode::Auto)
                .await
                .map_err(app::engine_error)?;
            answer_from_retrieved(&retrieved)
        }
    };

    let id = engine
        .record_interaction(NewInteraction {
            query: question.to_string(),
            answer: answer.text.clone(),
            sources: answer.sources.clone(),
            user_id: user.to_string(),
            matched_signature: answer.matched_signature.clone(),
            unanswered: answer.unanswered,
        })
        .await
        .map_err(app::engine_error)?;

    tracing::debug!(interaction = %id, origin = %answer.origin, "answer recorded");
    Ok((id, answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexrecall_core::models::{Hit, Strategy};

    #[test]
    fn test_no_match_answer() {
        let answer = answer_from_retrieved(&Retrieved::NoMatch);
        assert_eq!(answer.text, NO_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
        assert!(answer.unanswered);
    }

    #[test]
    fn test_top_hit_becomes_answer() {
        let hit = |id: &str, score: f64| Hit {
            doc_id: id.to_string(),
            title: "Luật Đất đai".to_string(),
            section: "Điều 69".to_string(),
            text: " Bồi thường về đất. ".to_string(),
            score,
            url: None,
        };
        let result = Retrieved::Hits {
            strategy: Strategy::ArticleExact,
            hits: vec![hit("d69", 1.0), hit("d70", 0.5)],
        };
        let answer = answer_from_retrieved(&result);
        assert_eq!(answer.text, "Luật Đất đai, Điều 69\nBồi thường về đất.");
        assert_eq!(answer.origin, "article-exact");
        assert_eq!(answer.confidence, 1.0);
        assert_eq!(answer.sources, vec!["d69", "d70"]);
        assert!(!answer.unanswered);
    }
}
