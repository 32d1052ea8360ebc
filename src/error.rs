//! Pipeline error taxonomy.
//!
//! Staging and processing failures abort the request; cache trouble never
//! does (the pipeline degrades to direct computation and logs it).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Local I/O failure while persisting the upload to the staging area.
    #[error("failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),

    /// External processor call failed, returned a malformed response, or
    /// exceeded the configured timeout.
    #[error("document processing failed: {0}")]
    Processing(String),
}

/// Cache-layer failure. Callers swallow and log these rather than surfacing
/// them: availability wins over caching guarantees.
#[derive(Debug, Error)]
#[error("cache unavailable: {0}")]
pub struct CacheUnavailable(pub String);

impl From<redis::RedisError> for CacheUnavailable {
    fn from(e: redis::RedisError) -> Self {
        Self(e.to_string())
    }
}
