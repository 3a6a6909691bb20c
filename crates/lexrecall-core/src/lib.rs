//! # lexrecall core
//!
//! Retrieval and learning logic for lexrecall: corpus snapshots, the
//! article / semantic / lexical / keyword strategies, the learned-answer
//! matcher, feedback processing, and the store traits the application
//! implements.
//!
//! This crate contains no SQL, HTTP, or filesystem I/O. Storage and
//! embedding backends are injected through [`store::DocumentSource`],
//! [`store::LearningStore`], and [`embedding::Embedder`].

pub mod article;
pub mod confidence;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod index;
pub mod keyword;
pub mod learning;
pub mod lexical;
pub mod models;
pub mod normalize;
pub mod router;
pub mod semantic;
pub mod store;
