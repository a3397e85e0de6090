//! HTTP query surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/run` | Execute a structured query |
//! | `POST` | `/voice` | Multipart audio upload → structured query |
//! | `POST` | `/image` | Multipart image upload → structured query |
//! | `POST` | `/events` | Content lifecycle event for the synchronizer |
//! | `GET`  | `/health` | Liveness check (returns version) |
//!
//! # Wire contract
//!
//! `/run` answers `{"results": {"hits": [...], "found": N, "page": N}}`,
//! adding `"fallback": true` when the hits came from the degraded
//! repository search. Every error response is `{"message": "..."}` with an
//! error status; internal failure detail is logged, never returned.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::ai::{self, AiProvider, OpenAiClient};
use crate::cache::QueryCache;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::db;
use crate::error::EngineError;
use crate::index::typesense::TypesenseClient;
use crate::index::SearchIndex;
use crate::models::StructuredQuery;
use crate::repository::SqliteCatalog;
use crate::scheduler::ResyncScheduler;
use crate::schema::SchemaManager;
use crate::search::{SearchExecutor, SearchService, SearchServiceError};
use crate::sync::{ContentEvent, SharedTypes, Synchronizer};

const MAX_AUDIO_BYTES: usize = 20 * 1024 * 1024;
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Clone)]
struct AppState {
    service: Arc<SearchService>,
    sync: Option<Arc<Synchronizer>>,
    cache: Arc<QueryCache>,
    ai: Arc<dyn AiProvider>,
}

/// `{"message": ...}` error body with an error status code.
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Starts the query server and the background resync loop.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.repository.path).await?;
    let repo = Arc::new(SqliteCatalog::new(pool));
    let types: SharedTypes = Arc::new(std::sync::RwLock::new(config.indexing.types.clone()));
    let clock = Arc::new(SystemClock);

    let mut sync = None;
    let executor = match TypesenseClient::new(&config.engine) {
        Ok(client) => {
            let index: Arc<dyn SearchIndex> = Arc::new(client);
            let schema = Arc::new(SchemaManager::new(
                index.clone(),
                &config.engine.collection,
            ));
            let scheduler = Arc::new(ResyncScheduler::new(
                Duration::from_secs(config.indexing.resync_delay_secs),
                clock.clone(),
            ));
            let synchronizer = Arc::new(Synchronizer::new(
                index.clone(),
                repo.clone(),
                schema.clone(),
                scheduler,
                types.clone(),
                config.indexing.page_size,
            ));
            tokio::spawn(synchronizer.clone().drive());
            sync = Some(synchronizer);
            Some(SearchExecutor::new(index, schema))
        }
        Err(EngineError::NotConfigured) => {
            warn!("search engine not configured; indexing disabled, fallback search only");
            None
        }
        Err(e) => {
            warn!("search engine client unavailable: {}", e);
            None
        }
    };

    let state = AppState {
        service: Arc::new(SearchService::new(executor, repo, types)),
        sync,
        cache: Arc::new(QueryCache::new(clock)),
        ai: Arc::new(OpenAiClient::new(&config.ai)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/run", post(handle_run))
        .route("/voice", post(handle_voice))
        .route("/image", post(handle_image))
        .route("/events", post(handle_event))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES + 1024 * 1024))
        .with_state(state);

    let bind_addr = &config.server.bind;
    info!("search server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /run ============

async fn handle_run(
    State(state): State<AppState>,
    Json(query): Json<StructuredQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.service.search(&query).await {
        Ok(results) => Ok(Json(serde_json::json!({ "results": results }))),
        Err(SearchServiceError::Invalid(e)) => Err(AppError::bad_request(e.to_string())),
        Err(e @ SearchServiceError::Unavailable) => Err(AppError::unavailable(e.to_string())),
    }
}

// ============ POST /voice and /image ============

struct Upload {
    bytes: Vec<u8>,
    mime: String,
}

/// Pull one named file field out of a multipart body.
async fn read_upload(
    multipart: &mut Multipart,
    field_name: &str,
    default_mime: &str,
) -> Option<Upload> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some(field_name) {
            continue;
        }
        let mime = field
            .content_type()
            .unwrap_or(default_mime)
            .to_string();
        let bytes = field.bytes().await.ok()?;
        return Some(Upload {
            bytes: bytes.to_vec(),
            mime,
        });
    }
    None
}

async fn handle_voice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let upload = read_upload(&mut multipart, "file", "audio/webm")
        .await
        .ok_or_else(|| AppError::bad_request("No audio file."))?;

    if upload.bytes.is_empty() {
        return Err(AppError::bad_request("No audio file."));
    }
    if upload.bytes.len() > MAX_AUDIO_BYTES {
        return Err(AppError::bad_request("Audio too large (max 20MB)."));
    }

    let query = ai::voice_query(
        state.ai.as_ref(),
        &state.cache,
        &upload.bytes,
        &upload.mime,
    )
    .await
    .map_err(|e| AppError::bad_request(e.to_string()))?;

    Ok(Json(serde_json::json!({ "query": query })))
}

async fn handle_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let upload = read_upload(&mut multipart, "image", "")
        .await
        .ok_or_else(|| AppError::bad_request("No image file."))?;

    if upload.bytes.is_empty() {
        return Err(AppError::bad_request("No image file."));
    }
    if !ALLOWED_IMAGE_TYPES.contains(&upload.mime.as_str()) {
        return Err(AppError::bad_request("Unsupported image type."));
    }
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::bad_request("Image too large (max 10MB)."));
    }

    let query = ai::image_query(
        state.ai.as_ref(),
        &state.cache,
        &upload.bytes,
        &upload.mime,
    )
    .await
    .map_err(|e| AppError::bad_request(e.to_string()))?;

    Ok(Json(serde_json::json!({ "query": query })))
}

// ============ POST /events ============

/// Feed one lifecycle event to the synchronizer. Indexing is
/// fire-and-forget: the response is success even when the index write
/// failed, matching the contract that content mutations are never blocked.
async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<ContentEvent>,
) -> Json<serde_json::Value> {
    match &state.sync {
        Some(sync) => sync.handle(event).await,
        None => warn!("lifecycle event received but indexing is disabled"),
    }
    Json(serde_json::json!({ "ok": true }))
}
