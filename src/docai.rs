//! Google Document AI client.
//!
//! Talks to the Document AI v1 REST API (`:process`) using service account
//! JWT authentication with an in-process token cache. The raw wire types
//! below follow the API's camelCase JSON; normalization into the response
//! shape lives in [`crate::entities`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Settings;

const CLOUD_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Capability of turning staged bytes into a raw entity list. The pipeline
/// depends on this trait so tests can script the external call.
#[async_trait::async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn process(&self, file_path: &Path, mime_type: &str) -> Result<RawDocument>;
}

// ── Document AI wire types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntity {
    /// Entity type; splitter/classifier processors may omit it.
    #[serde(default, rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub mention_text: String,
    #[serde(default)]
    pub mention_id: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub page_anchor: Option<PageAnchor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnchor {
    #[serde(default)]
    pub page_refs: Vec<PageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRef {
    /// 0-indexed page number. The API serializes this int64 as a JSON
    /// string, so accept both forms.
    #[serde(default, deserialize_with = "page_from_string_or_number")]
    pub page: u32,
    #[serde(default)]
    pub bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingPoly {
    #[serde(default)]
    pub normalized_vertices: Vec<NormalizedVertex>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizedVertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

fn page_from_string_or_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Number(u32),
        String(String),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocumentContent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocumentContent {
    /// Base64-encoded file bytes.
    content: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    document: RawDocument,
}

// ── Service account auth ─────────────────────────────────────────────────────

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct GoogleDocumentAi {
    project_id: String,
    location: String,
    processor_id: String,
    processor_version: Option<String>,
    sa_key: ServiceAccountKey,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
    client: reqwest::Client,
}

impl GoogleDocumentAi {
    /// Build a client from settings, reading the service account key file.
    pub fn from_settings(settings: &Settings, client: reqwest::Client) -> Result<Self> {
        let key_json = std::fs::read_to_string(&settings.credentials_path).with_context(|| {
            format!(
                "Failed to read service account key: {:?}",
                settings.credentials_path
            )
        })?;
        let sa_key: ServiceAccountKey =
            serde_json::from_str(&key_json).context("Failed to parse service account key")?;

        info!(
            "Document AI client initialized (project: {}, processor: {})",
            settings.project_id, settings.processor_id
        );

        Ok(Self {
            project_id: settings.project_id.clone(),
            location: settings.location.clone(),
            processor_id: settings.processor_id.clone(),
            processor_version: settings.processor_version.clone(),
            sa_key,
            token_cache: Arc::new(Mutex::new(None)),
            client,
        })
    }

    /// Full processor resource name, versioned when a version is pinned.
    fn processor_name(&self) -> String {
        let base = format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, self.processor_id
        );
        match &self.processor_version {
            Some(version) => format!("{}/processorVersions/{}", base, version),
            None => base,
        }
    }

    fn process_url(&self) -> String {
        format!(
            "https://{}-documentai.googleapis.com/v1/{}:process",
            self.location,
            self.processor_name()
        )
    }

    /// Get a valid OAuth2 access token, refreshing if expired.
    async fn get_access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.lock().unwrap();
            if let Some(ref cached) = *cache {
                if now_secs() < cached.expires_at.saturating_sub(60) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let now = now_secs();
        let claims = serde_json::json!({
            "iss": self.sa_key.client_email,
            "scope": CLOUD_SCOPE,
            "aud": TOKEN_URI,
            "iat": now,
            "exp": now + 3600,
        });

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let encoding_key =
            jsonwebtoken::EncodingKey::from_rsa_pem(self.sa_key.private_key.as_bytes())
                .context("Invalid RSA private key in service account JSON")?;
        let jwt = jsonwebtoken::encode(&header, &claims, &encoding_key)
            .context("Failed to encode JWT")?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let resp: TokenResponse = self
            .client
            .post(TOKEN_URI)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        let token = resp.access_token.clone();
        {
            let mut cache = self.token_cache.lock().unwrap();
            *cache = Some(CachedToken {
                access_token: resp.access_token,
                expires_at: now + resp.expires_in,
            });
        }

        Ok(token)
    }
}

#[async_trait::async_trait]
impl DocumentProcessor for GoogleDocumentAi {
    async fn process(&self, file_path: &Path, mime_type: &str) -> Result<RawDocument> {
        let bytes = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("Failed to read staged file: {:?}", file_path))?;

        let token = self.get_access_token().await?;
        let body = ProcessRequest {
            raw_document: RawDocumentContent {
                content: BASE64.encode(&bytes),
                mime_type: mime_type.to_string(),
            },
        };

        info!(
            "Calling Document AI: {} ({} bytes, {})",
            self.processor_name(),
            bytes.len(),
            mime_type
        );

        let resp = self
            .client
            .post(self.process_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Document AI request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Document AI error ({}): {}", status, text);
        }

        let parsed: ProcessResponse = resp
            .json()
            .await
            .context("Failed to parse Document AI response")?;

        debug!(
            "Document AI returned {} entities",
            parsed.document.entities.len()
        );
        Ok(parsed.document)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
