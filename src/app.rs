//! Wires the SQLite store, embedding provider, and normalizer into an
//! [`Engine`].
//!
//! The CLI is one process per command, so commands that read the index
//! call [`open_indexed`], which builds the snapshot before returning.

use anyhow::Result;
use std::sync::Arc;

use lexrecall_core::engine::Engine;
use lexrecall_core::error::EngineError;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub engine: Engine,
    pub store: Arc<SqliteStore>,
}

impl App {
    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}

/// Connect, apply migrations, and build an engine without an index.
pub async fn open(config: &Config) -> Result<App> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool));
    let embedder = create_embedder(&config.embedding)?;
    let normalizer = Arc::new(config.normalizer.build());

    let engine = Engine::new(
        store.clone(),
        store.clone(),
        embedder,
        normalizer,
        config.params(),
    );
    Ok(App { engine, store })
}

/// [`open`], then build the index snapshot.
pub async fn open_indexed(config: &Config) -> Result<App> {
    let app = open(config).await?;
    let report = app.engine.rebuild_index().await.map_err(engine_error)?;
    tracing::debug!(
        documents = report.documents,
        embedded = report.embedded,
        "snapshot ready"
    );
    Ok(app)
}

/// Convert a core error for CLI reporting. Storage failures are logged
/// before they are unwrapped.
pub fn engine_error(e: EngineError) -> anyhow::Error {
    if e.is_fatal() {
        tracing::error!(error = %e, "storage failure");
    }
    match e {
        EngineError::Storage(inner) => inner,
        other => anyhow::Error::new(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_keep_their_kind() {
        let err = engine_error(EngineError::InvalidRating { rating: 9 });
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidRating { rating: 9 })
        ));
        assert_eq!(err.to_string(), "invalid rating 9: must be between 1 and 5");
    }

    #[test]
    fn test_storage_errors_are_unwrapped() {
        let err = engine_error(EngineError::Storage(anyhow::anyhow!("disk I/O error")));
        assert!(err.downcast_ref::<EngineError>().is_none());
        assert_eq!(err.to_string(), "disk I/O error");
    }
}
