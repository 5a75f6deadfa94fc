//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `{prefix}/chat` | Run one chat turn |
//! | `POST` | `{prefix}/documents/upload` | Ingest a PDF, DOCX or TXT file (multipart field `file`) |
//! | `GET`  | `{prefix}/export-chat/{chat_id}` | Download a chat transcript as PDF |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `{prefix}` is `[server].api_prefix`, `/api/v1` by default.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message content must not be empty" } }
//! ```
//!
//! Error codes: `bad_request`, `oversize_file`, `unsupported_format`,
//! `extraction_failed`, `indexing_failed` (400), `not_found` (404),
//! `model_error`, `internal` (500).

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::export::ExportService;
use crate::index::{InMemoryIndexService, IndexId, IndexService};
use crate::ingest::{DocumentIngestor, IngestError};
use crate::llm::{GeminiClient, ModelClient};
use crate::models::{ChatMessage, ChatResponse, UploadResponse};
use crate::orchestrator::{ChatError, ChatOrchestrator};
use crate::session::SessionStore;
use crate::web_search::{DuckDuckGoSearch, NoSearch, WebSearch};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<ChatOrchestrator>,
    ingestor: Arc<DocumentIngestor>,
    sessions: Arc<SessionStore>,
    exporter: Arc<ExportService>,
}

impl AppState {
    pub fn new(
        config: &Config,
        model: Arc<dyn ModelClient>,
        search: Arc<dyn WebSearch>,
        index: Arc<dyn IndexService>,
    ) -> Self {
        Self {
            config: Arc::new(config.clone()),
            orchestrator: Arc::new(ChatOrchestrator::new(model, search, index.clone(), config)),
            ingestor: Arc::new(DocumentIngestor::new(index, config)),
            sessions: Arc::new(SessionStore::new(config.conversation.max_turns)),
            exporter: Arc::new(ExportService::default()),
        }
    }

    /// Replaces the ingestor, e.g. to point uploads at another scratch dir.
    pub fn with_ingestor(mut self, ingestor: DocumentIngestor) -> Self {
        self.ingestor = Arc::new(ingestor);
        self
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }
}

/// Builds the router for `state`. Used by [`run_server`] and by tests.
pub fn build_router(state: AppState) -> Router {
    let body_limit = (state.ingestor.max_file_size() as usize).saturating_add(1024 * 1024);

    let api = Router::new()
        .route("/chat", post(handle_chat))
        .route(
            "/documents/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/export-chat/{chat_id}", get(handle_export));

    let prefix = state.config.server.api_prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(prefix, api)
    };

    router
        .route("/health", get(handle_health))
        .layer(cors_layer(&state.config.server.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Starts the HTTP server with the configured model, search provider and
/// embedder, plus a background task that drops expired document indexes and
/// idle chat sessions. Runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let index = Arc::new(InMemoryIndexService::new(embedder));
    let model: Arc<dyn ModelClient> = Arc::new(GeminiClient::new(&config.model)?);
    let search: Arc<dyn WebSearch> = if config.search.enabled {
        Arc::new(DuckDuckGoSearch::new(&config.search)?)
    } else {
        Arc::new(NoSearch)
    };

    let state = AppState::new(config, model, search, index.clone());
    spawn_sweeper(
        Sweeper {
            index,
            sessions: state.sessions(),
            index_ttl: Duration::from_secs(config.index.ttl_secs),
            session_idle: Duration::from_secs(config.conversation.idle_ttl_secs),
        },
        Duration::from_secs(config.index.sweep_interval_secs.max(1)),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        prefix = %config.server.api_prefix,
        "efiko server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

struct Sweeper {
    index: Arc<InMemoryIndexService>,
    sessions: Arc<SessionStore>,
    index_ttl: Duration,
    session_idle: Duration,
}

impl Sweeper {
    fn sweep(&self) {
        let dropped = self.index.sweep_expired(self.index_ttl);
        if dropped > 0 {
            tracing::info!(dropped, remaining = self.index.len(), "swept expired document indexes");
        }
        let dropped = self.sessions.sweep_idle(self.session_idle);
        if dropped > 0 {
            tracing::info!(dropped, remaining = self.sessions.len(), "swept idle chat sessions");
        }
    }
}

fn spawn_sweeper(sweeper: Sweeper, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweeper.sweep();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code,
        message: message.into(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => bad_request("bad_request", err.to_string()),
            ChatError::UnknownDocument(_) => not_found(err.to_string()),
            ChatError::Retrieval(_) => internal("internal", "failed to search the document"),
            ChatError::Model(_) => internal("model_error", "failed to generate a response"),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let code = match &err {
            IngestError::OversizeFile { .. } => "oversize_file",
            IngestError::UnsupportedFormat(_) => "unsupported_format",
            IngestError::ExtractionFailure(_) => "extraction_failed",
            IngestError::IndexingFailure(_) => "indexing_failed",
            IngestError::Storage(_) => {
                tracing::error!(error = %err, "failed to stage upload");
                return internal("internal", "failed to store upload");
            }
        };
        bad_request(code, err.to_string())
    }
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

// ============ POST {prefix}/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(message): Json<ChatMessage>,
) -> Result<Json<ChatResponse>, AppError> {
    if message.content.trim().is_empty() {
        return Err(bad_request("bad_request", "message content must not be empty"));
    }

    let document = message.vectorstore_id.as_deref().map(IndexId::from);
    let chat_id = SessionStore::resolve_id(message.chat_id.as_deref());

    // A new session is stored only once its first turn succeeds.
    let reply = match state.sessions.get(&chat_id) {
        Some(handle) => {
            let mut session = handle.lock().await;
            let reply = state
                .orchestrator
                .respond(&mut session.buffer, &message.content, document.as_ref())
                .await?;
            session.record_latest(2);
            reply
        }
        None => {
            let mut session = state.sessions.start(&message.conversation_history);
            let reply = state
                .orchestrator
                .respond(&mut session.buffer, &message.content, document.as_ref())
                .await?;
            session.record_latest(2);
            state.sessions.insert(&chat_id, session).await;
            reply
        }
    };

    Ok(Json(ChatResponse {
        content: reply,
        timestamp: Utc::now().to_rfc3339(),
        chat_id,
    }))
}

// ============ POST {prefix}/documents/upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let max_file_size = state.ingestor.max_file_size();
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            bad_request(
                "oversize_file",
                format!("upload exceeds the {} byte limit", max_file_size),
            )
        } else {
            bad_request("bad_request", e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let outcome = state.ingestor.ingest(&filename, &bytes).await?;
        return Ok(Json(UploadResponse {
            success: true,
            message: "Document processed successfully".to_string(),
            vectorstore_id: outcome.index_id.to_string(),
        }));
    }

    Err(bad_request("bad_request", "multipart field 'file' is required"))
}

// ============ GET {prefix}/export-chat/{chat_id} ============

async fn handle_export(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Response, AppError> {
    let session = state
        .sessions
        .get(&chat_id)
        .ok_or_else(|| not_found(format!("chat not found: {}", chat_id)))?;
    let transcript = session.lock().await.transcript.clone();

    let exporter = state.exporter.clone();
    let pdf = tokio::task::spawn_blocking(move || exporter.render(&transcript))
        .await
        .map_err(|e| internal("internal", e.to_string()))?
        .map_err(|e| internal("internal", e.to_string()))?;

    let disposition = format!("attachment; filename=chat_{}.pdf", chat_id);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| bad_request("bad_request", "chat id is not a valid file name"))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}
