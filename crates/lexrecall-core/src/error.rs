//! Error taxonomy for engine operations.
//!
//! Retrieval never surfaces [`EngineError::ProviderTimeout`]; the router
//! degrades to the next strategy instead. [`EngineError::Storage`] is the
//! only class callers should treat as fatal.

/// Errors returned by [`Engine`](crate::engine::Engine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid rating {rating}: must be between 1 and 5")]
    InvalidRating { rating: i64 },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    #[error("embedding provider did not respond within {after_ms} ms")]
    ProviderTimeout { after_ms: u64 },

    #[error("index rebuild already in progress")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
