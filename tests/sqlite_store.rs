//! SqliteStore behaviour, alone and behind the engine.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use lexrecall::config::Config;
use lexrecall::sqlite_store::SqliteStore;
use lexrecall::{db, migrate};
use lexrecall_core::engine::{Engine, EngineParams};
use lexrecall_core::error::EngineError;
use lexrecall_core::models::{
    Document, Interaction, InteractionStatus, NewInteraction, Pattern, RatingEntry, SearchMode,
    Strategy,
};
use lexrecall_core::normalize::{signature, token_list, SimpleNormalizer};
use lexrecall_core::store::{DocumentSource, FeedbackUpdate, LearningStore};

fn test_config(tmp: &TempDir) -> Config {
    let content = format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("data/lexr.sqlite").display()
    );
    toml::from_str(&content).unwrap()
}

async fn open_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let config = test_config(tmp);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

fn doc(id: &str, section: &str, article: Option<u32>, text: &str) -> Document {
    Document {
        id: id.to_string(),
        title: "Luật Đất đai 2024".to_string(),
        section: section.to_string(),
        article_number: article,
        text: text.to_string(),
        url: None,
    }
}

fn interaction(id: &str, query: &str) -> Interaction {
    let tokens = token_list(&query.split_whitespace().map(str::to_string).collect::<Vec<_>>());
    Interaction {
        id: id.to_string(),
        query: query.to_string(),
        signature: signature(&tokens),
        tokens,
        answer: format!("answer {}", id),
        sources: vec!["d1".to_string()],
        user_id: "u1".to_string(),
        created_at: Utc::now(),
        ratings: Vec::new(),
        rating: None,
        status: InteractionStatus::Pending,
        promoted: false,
        matched_signature: None,
        unanswered: false,
    }
}

fn rated(mut i: Interaction, rating: u8, promote: bool) -> FeedbackUpdate {
    let now = Utc::now();
    let entry = RatingEntry {
        rating,
        feedback: Some("ok".to_string()),
        at: now,
    };
    i.ratings.push(entry.clone());
    i.rating = Some(rating);
    i.status = InteractionStatus::ConfirmedGood;
    i.promoted = promote;
    let promote = promote.then(|| Pattern::from_interaction(&i, rating, now));
    FeedbackUpdate {
        interaction: i,
        entry,
        promote,
    }
}

#[tokio::test]
async fn test_documents_replace_and_upsert_keep_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .replace_documents(&[
            doc("b", "Điều 2", Some(2), "hai"),
            doc("a", "Điều 1", Some(1), "một"),
        ])
        .await
        .unwrap();
    store
        .upsert_documents(&[doc("c", "Điều 3", None, "ba"), doc("b", "Điều 2", Some(2), "hai mới")])
        .await
        .unwrap();

    let docs = store.list_documents().await.unwrap();
    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);
    assert_eq!(docs[0].text, "hai mới");
    assert_eq!(docs[0].article_number, Some(2));
    assert_eq!(docs[2].article_number, None);
    assert_eq!(store.document_count().await.unwrap(), 3);

    store
        .replace_documents(&[doc("z", "", None, "z")])
        .await
        .unwrap();
    assert_eq!(store.document_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_interaction_round_trip_with_history() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let i = interaction("i1", "quyền sử dụng đất");
    store.insert_interaction(&i).await.unwrap();
    assert!(store.insert_interaction(&i).await.is_err());

    let loaded = store.get_interaction("i1").await.unwrap().unwrap();
    assert_eq!(loaded.tokens, i.tokens);
    assert_eq!(loaded.sources, i.sources);
    assert_eq!(loaded.status, InteractionStatus::Pending);
    assert_eq!(
        loaded.created_at.timestamp_millis(),
        i.created_at.timestamp_millis()
    );

    store.record_feedback(&rated(loaded, 3, false)).await.unwrap();
    let again = store.get_interaction("i1").await.unwrap().unwrap();
    store.record_feedback(&rated(again, 5, false)).await.unwrap();

    let loaded = store.get_interaction("i1").await.unwrap().unwrap();
    assert_eq!(loaded.rating, Some(5));
    let history: Vec<u8> = loaded.ratings.iter().map(|r| r.rating).collect();
    assert_eq!(history, vec![3, 5]);
    assert_eq!(loaded.ratings[0].feedback.as_deref(), Some("ok"));

    assert!(store.get_interaction("missing").await.unwrap().is_none());
    assert_eq!(store.list_interactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pattern_upsert_accumulates() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    for id in ["i1", "i2"] {
        store
            .insert_interaction(&interaction(id, "bồi thường đất"))
            .await
            .unwrap();
    }

    let first = store
        .record_feedback(&rated(interaction("i1", "bồi thường đất"), 4, true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.usage_count, 1);

    let second = store
        .record_feedback(&rated(interaction("i2", "bồi thường đất"), 5, true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.usage_count, 2);
    assert_eq!(second.rating_count, 2);
    assert_eq!(second.rating_sum, 9.0);
    assert_eq!(second.interaction_id, "i1");
    assert_eq!(second.answer, "answer i1");

    let stored = store.get_pattern(&second.signature).await.unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(store.list_patterns().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_feedback_on_unknown_interaction_rolls_back() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let update = rated(interaction("ghost", "đất"), 5, true);
    assert!(store.record_feedback(&update).await.is_err());
    assert!(store.list_patterns().await.unwrap().is_empty());

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interaction_ratings")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_synonym_pairs_counted_unordered() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert_eq!(store.bump_synonym_pair("mua", "bán").await.unwrap(), 1);
    assert_eq!(store.bump_synonym_pair("bán", "mua").await.unwrap(), 2);
    assert!(store.bump_synonym_pair("đất", "đất").await.is_err());

    let pairs = store.list_synonym_pairs().await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].term_a, "bán");
    assert_eq!(pairs[0].term_b, "mua");
    assert_eq!(pairs[0].count, 2);
}

fn engine(store: Arc<SqliteStore>) -> Engine {
    Engine::new(
        store.clone(),
        store,
        None,
        Arc::new(SimpleNormalizer::default()),
        EngineParams::default(),
    )
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store
        .replace_documents(&[
            doc("d1", "Điều 1", Some(1), "phạm vi điều chỉnh của luật đất đai"),
            doc("d69", "Điều 69", Some(69), "bồi thường đất khi nhà nước thu hồi đất"),
            doc("d152", "Điều 152", Some(152), "thuế sử dụng đất nông nghiệp"),
        ])
        .await
        .unwrap();

    let engine = engine(store.clone());
    let report = engine.rebuild_index().await.unwrap();
    assert_eq!(report.documents, 3);
    assert!(!report.embedded);

    let found = engine
        .retrieve("Điều 69 nói gì", None, SearchMode::Auto)
        .await
        .unwrap();
    assert_eq!(found.strategy(), Some(Strategy::ArticleExact));
    assert_eq!(found.hits()[0].doc_id, "d69");

    let id = engine
        .record_interaction(NewInteraction {
            query: "bồi thường thu hồi đất".to_string(),
            answer: "Điều 69".to_string(),
            sources: vec!["d69".to_string()],
            user_id: "u1".to_string(),
            matched_signature: None,
            unanswered: false,
        })
        .await
        .unwrap();

    assert!(matches!(
        engine.submit_feedback(&id, 0, None).await,
        Err(EngineError::InvalidRating { rating: 0 })
    ));

    let outcome = engine.submit_feedback(&id, 5, None).await.unwrap();
    assert_eq!(outcome.status, InteractionStatus::ConfirmedGood);
    assert!(outcome.promoted.is_some());

    let learned = engine
        .find_learned_answer("thu hồi đất bồi thường")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(learned.answer, "Điều 69");
    assert_eq!(learned.confidence, 1.0);

    let stats = engine.learning_stats().await.unwrap();
    assert_eq!(stats.total_interactions, 1);
    assert_eq!(stats.positive_feedback, 1);
    assert_eq!(stats.total_patterns_learned, 1);
    assert_eq!(stats.avg_rating, 5.0);
}

#[tokio::test]
async fn test_served_answers_grow_synonyms_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let engine = engine(store.clone());

    let original = engine
        .record_interaction(NewInteraction {
            query: "mua bán đất".to_string(),
            answer: "Điều 45".to_string(),
            ..NewInteraction::default()
        })
        .await
        .unwrap();
    let promoted = engine.submit_feedback(&original, 5, None).await.unwrap();
    let signature = promoted.promoted.unwrap().signature;

    for _ in 0..2 {
        let id = engine
            .record_interaction(NewInteraction {
                query: "chuyển nhượng đất".to_string(),
                answer: "Điều 45".to_string(),
                matched_signature: Some(signature.clone()),
                ..NewInteraction::default()
            })
            .await
            .unwrap();
        let outcome = engine.submit_feedback(&id, 4, None).await.unwrap();
        assert_eq!(outcome.synonym_pairs_bumped, 4);
    }

    let mut synonyms = engine.synonyms("chuyển").await.unwrap();
    synonyms.sort();
    assert_eq!(synonyms, vec!["bán", "mua"]);
}

#[tokio::test]
async fn test_unanswered_question_not_served_after_corpus_grows() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let engine = engine(store.clone());
    engine.rebuild_index().await.unwrap();

    let id = engine
        .record_interaction(NewInteraction {
            query: "bồi thường đất".to_string(),
            answer: "Không tìm thấy thông tin phù hợp.".to_string(),
            unanswered: true,
            ..NewInteraction::default()
        })
        .await
        .unwrap();
    assert!(store.get_interaction(&id).await.unwrap().unwrap().unanswered);

    store
        .replace_documents(&[
            doc("d69", "Điều 69", Some(69), "bồi thường đất khi nhà nước thu hồi đất"),
            doc("d152", "Điều 152", Some(152), "thuế sử dụng đất nông nghiệp"),
        ])
        .await
        .unwrap();
    engine.rebuild_index().await.unwrap();

    assert!(engine
        .find_learned_answer("bồi thường đất")
        .await
        .unwrap()
        .is_none());
    let found = engine
        .retrieve("bồi thường đất", None, SearchMode::Auto)
        .await
        .unwrap();
    assert_eq!(found.hits()[0].doc_id, "d69");

    // still ratable, never promoted
    let outcome = engine.submit_feedback(&id, 5, None).await.unwrap();
    assert_eq!(outcome.status, InteractionStatus::ConfirmedGood);
    assert!(outcome.promoted.is_none());
    assert!(engine
        .find_learned_answer("bồi thường đất")
        .await
        .unwrap()
        .is_none());
}
