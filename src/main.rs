//! docai-relay - upload gateway that forwards documents to Google Document AI
//! and caches normalized extraction results in Redis.

mod cache;
mod config;
mod docai;
mod entities;
mod error;
mod pipeline;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache::RedisCacheStore;
use config::{AwsSettings, Settings};
use docai::GoogleDocumentAi;
use entities::ExtractionResult;
use error::PipelineError;
use pipeline::Pipeline;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docai_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // Collaborator config for the Textract path; recognized, not used here.
    let _aws = AwsSettings::from_env();

    // Shared handles, created once at startup.
    let http_client = reqwest::Client::new();
    let cache = RedisCacheStore::connect(&settings.redis_url)
        .await
        .map_err(|e| anyhow::anyhow!("Redis startup connection failed: {}", e))?;
    let processor = GoogleDocumentAi::from_settings(&settings, http_client)?;

    let pipeline = Pipeline::new(
        Arc::new(cache),
        Arc::new(processor),
        settings.staging_dir.clone(),
        settings.cache_ttl,
        settings.process_timeout,
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = Router::new()
        .route("/status", get(status))
        .route("/file_upload", post(file_upload))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    } else {
        info!("Shutting down");
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness check.
async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "running" }))
}

/// Upload a document, return its extracted entities (cached or fresh).
async fn file_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractionResult>, (StatusCode, String)> {
    // Read the uploaded file
    let mut filename = String::new();
    let mut mime_type = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("document").to_string();
            mime_type = field
                .content_type()
                .unwrap_or("application/pdf")
                .to_string();
            file_data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                .to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    info!(
        "Received file: {} ({} bytes, {})",
        filename,
        file_data.len(),
        mime_type
    );

    let result = state
        .pipeline
        .get_or_process(&filename, &file_data, &mime_type)
        .await
        .map_err(|e| {
            error!("Upload handling failed: {}", e);
            match e {
                PipelineError::Staging(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                PipelineError::Processing(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
            }
        })?;

    info!(
        "Returning {} entities for {}",
        result.entities.len(),
        filename
    );
    Ok(Json(result))
}
