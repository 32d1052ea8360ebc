//! Cache-aside document processing pipeline.
//!
//! One idempotent get-or-compute operation: check the result cache, and on a
//! miss stage the upload to disk, call the external processor under a
//! timeout, normalize, populate the cache, and clean up the staging file on
//! every exit path. Cache failures degrade to direct computation; they never
//! fail the request.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::docai::DocumentProcessor;
use crate::entities::{self, ExtractionResult};
use crate::error::PipelineError;

pub struct Pipeline {
    cache: Arc<dyn CacheStore>,
    processor: Arc<dyn DocumentProcessor>,
    staging_dir: PathBuf,
    cache_ttl: Duration,
    process_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        processor: Arc<dyn DocumentProcessor>,
        staging_dir: PathBuf,
        cache_ttl: Duration,
        process_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            processor,
            staging_dir,
            cache_ttl,
            process_timeout,
        }
    }

    /// Return the cached result for these bytes, or process them and cache
    /// the outcome. The cache key is derived from the content, so re-uploads
    /// of identical bytes never hit the external processor within the TTL.
    ///
    /// Note: two concurrent misses for the same bytes will both call the
    /// processor. Their results agree, so the second write is harmless; no
    /// per-key coalescing is done.
    pub async fn get_or_process(
        &self,
        filename: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let key = content_key(bytes);

        match self.cache.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<ExtractionResult>(&json) {
                Ok(result) => {
                    info!("Cache hit for '{}' (key {})", filename, key);
                    return Ok(result);
                }
                Err(e) => {
                    warn!("Corrupt cache entry under {}, reprocessing: {}", key, e);
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("Cache read failed, processing without cache: {}", e);
            }
        }

        let staged = StagedFile::write(&self.staging_dir, filename, bytes).await?;
        info!(
            "Staged '{}' ({} bytes) at {:?}",
            filename,
            bytes.len(),
            staged.path()
        );

        let raw = match tokio::time::timeout(
            self.process_timeout,
            self.processor.process(staged.path(), mime_type),
        )
        .await
        {
            Ok(Ok(document)) => document,
            Ok(Err(e)) => return Err(PipelineError::Processing(format!("{:#}", e))),
            Err(_) => {
                return Err(PipelineError::Processing(format!(
                    "timed out after {:?}",
                    self.process_timeout
                )))
            }
        };

        let result = entities::normalize(&raw);

        match serde_json::to_string(&result) {
            Ok(json) => {
                if let Err(e) = self.cache.set(&key, &json, self.cache_ttl).await {
                    warn!("Cache write failed, returning uncached result: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize result for caching: {}", e),
        }

        staged.remove().await;
        Ok(result)
    }
}

/// Content-derived cache key: hex SHA-256 of the uploaded bytes.
fn content_key(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A staged upload on disk, removed on every exit path. Explicit async
/// removal on the success path; the `Drop` impl covers early returns.
struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    async fn write(dir: &Path, filename: &str, bytes: &[u8]) -> Result<Self, PipelineError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(PipelineError::Staging)?;

        // Unique prefix so concurrent uploads of the same name never collide.
        let path = dir.join(format!("{}-{}", uuid::Uuid::new_v4(), sanitize(filename)));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(PipelineError::Staging)?;

        Ok(Self { path, armed: true })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal. Failure is logged, never propagated.
    async fn remove(mut self) {
        self.armed = false;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!("Failed to remove staging file {:?}: {}", self.path, e);
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove staging file {:?}: {}", self.path, e);
            }
        }
    }
}

/// Strip any path components from a client-supplied filename.
fn sanitize(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "document".to_string()
    } else {
        name.to_string()
    }
}
