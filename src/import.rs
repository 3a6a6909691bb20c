//! `lexr import`: load a JSON array of documents into the corpus.
//!
//! ```json
//! [
//!   { "id": "luat-dat-dai-69", "title": "Luật Đất đai", "section": "Điều 69",
//!     "article_number": 69, "text": "...", "url": "https://..." }
//! ]
//! ```
//!
//! `section`, `article_number`, and `url` are optional. A missing
//! `article_number` is detected from the section label.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

use lexrecall_core::article::article_number_of;
use lexrecall_core::models::Document;

use crate::app;
use crate::config::Config;

/// Parse and validate an import file.
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let mut docs: Vec<Document> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {}", path.display()))?;

    let mut seen = HashSet::new();
    for doc in &mut docs {
        if doc.id.trim().is_empty() {
            bail!("document with title '{}' has an empty id", doc.title);
        }
        if !seen.insert(doc.id.clone()) {
            bail!("duplicate document id in import file: {}", doc.id);
        }
        if doc.text.trim().is_empty() {
            bail!("document {} has no text", doc.id);
        }
        doc.article_number = article_number_of(doc);
    }
    Ok(docs)
}

pub async fn run_import(config: &Config, path: &Path, replace: bool) -> Result<()> {
    let docs = read_documents(path)?;
    let app = app::open(config).await?;

    let written = if replace {
        app.store.replace_documents(&docs).await?
    } else {
        app.store.upsert_documents(&docs).await?
    };
    let total = app.store.document_count().await?;
    tracing::info!(written, total, replace, "documents imported");

    println!(
        "Imported {} documents ({} in corpus){}",
        written,
        total,
        if replace { ", corpus replaced" } else { "" }
    );
    app.close().await;
    Ok(())
}
