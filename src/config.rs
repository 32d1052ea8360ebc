#![allow(dead_code)]
//! Environment-driven service configuration.
//!
//! Required vars identify the Document AI processor; everything else has a
//! deployment default. AWS credentials are recognized collaborator config
//! (the Textract path) and are loaded but not used by the pipeline.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default TTL for cached extraction results: 24 hours.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86400;
/// Default upper bound on a single Document AI call.
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Google Cloud project that owns the processor.
    pub project_id: String,
    /// Processor location, e.g. "us" or "eu".
    pub location: String,
    pub processor_id: String,
    /// Optional pinned processor version; unset means the default version.
    pub processor_version: Option<String>,
    /// Path to the service account key JSON.
    pub credentials_path: PathBuf,

    pub redis_url: String,
    pub staging_dir: PathBuf,
    pub cache_ttl: Duration,
    pub process_timeout: Duration,
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let project_id = require("PROJECT_ID")?;
        let location = require("LOCATION")?;
        let processor_id = require("PROCESSOR_ID")?;
        let processor_version = std::env::var("PROCESSOR_VERSION").ok();
        let credentials_path = require("GOOGLE_APPLICATION_CREDENTIALS")?.into();

        Ok(Self {
            project_id,
            location,
            processor_id,
            processor_version,
            credentials_path,
            redis_url: redis_url_from_env(),
            staging_dir: std::env::var("STAGING_DIR")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),
            cache_ttl: Duration::from_secs(parse_secs("CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)),
            process_timeout: Duration::from_secs(parse_secs(
                "PROCESS_TIMEOUT_SECS",
                DEFAULT_PROCESS_TIMEOUT_SECS,
            )),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }
}

/// AWS collaborator credentials (Textract path — not exercised by the
/// pipeline). All vars must be present, otherwise the block is disabled.
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl AwsSettings {
    /// Try to load from env. Returns `None` if any variable is missing.
    pub fn from_env() -> Option<Self> {
        // Both spellings appear in deployments.
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("AWS_ACCESS_KEY"))
            .ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let region = std::env::var("AWS_REGION").ok()?;
        info!("AWS credentials present (region: {})", region);
        Some(Self {
            access_key_id,
            secret_access_key,
            region,
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set", name))
}

fn parse_secs(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(
                "{}={} is not a valid number of seconds, using {}",
                name, raw, default
            );
            default
        }),
        Err(_) => default,
    }
}

fn redis_url_from_env() -> String {
    if let Ok(url) = std::env::var("REDIS_URL") {
        return url;
    }
    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "redis:6379".to_string());
    match std::env::var("REDIS_PASSWORD") {
        Ok(password) if !password.is_empty() => compose_redis_url(&host, Some(&password)),
        _ => compose_redis_url(&host, None),
    }
}

/// Build a redis:// URL from a host and optional password.
fn compose_redis_url(host: &str, password: Option<&str>) -> String {
    match password {
        Some(p) => format!("redis://:{}@{}", p, host),
        None => format!("redis://{}", host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_redis_url_with_password() {
        assert_eq!(
            compose_redis_url("redis:6379", Some("hunter2")),
            "redis://:hunter2@redis:6379"
        );
    }

    #[test]
    fn test_compose_redis_url_without_password() {
        assert_eq!(
            compose_redis_url("localhost:6379", None),
            "redis://localhost:6379"
        );
    }
}
