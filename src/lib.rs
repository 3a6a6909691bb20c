//! # lexrecall
//!
//! An adaptive retrieval engine for legal text that learns from answer
//! ratings.
//!
//! Documents are imported into SQLite, indexed into an immutable snapshot
//! (TF-IDF matrix, token sets, optional embeddings), and queried through a
//! cascade: article reference, semantic, TF-IDF, keyword. Rated answers are
//! reused for similar questions and grow a synonym table that expands later
//! queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ JSON import│──▶│    SQLite    │──▶│ lexrecall-core Engine│
//! └────────────┘   │ docs+learning│◀──│ index/router/learning│
//!                  └──────────────┘   └──────────┬───────────┘
//!                                                ▼
//!                                          ┌──────────┐
//!                                          │   CLI    │
//!                                          │  (lexr)  │
//!                                          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexr init
//! lexr import ./data/luat-dat-dai.json
//! lexr search "Điều 69"
//! lexr ask "bồi thường khi thu hồi đất"
//! lexr feedback <interaction-id> 5
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite storage for documents and learning state |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, fastembed) |
//! | [`app`] | Engine wiring |
//! | [`import`] | JSON document import |
//! | [`search`] | Retrieval output |
//! | [`ask`] | Answer, record, and report confidence |
//! | [`feedback`] | Ratings |
//! | [`stats`] | Learning statistics, top questions, synonyms |
//! | [`export`] | Learned data export |
//! | [`logging`] | Tracing setup |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod feedback;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
