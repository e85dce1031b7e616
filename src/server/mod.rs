// Web surface
// Chat page, chat API, listing generator API and health check over axum


use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::SupportError;
use crate::app_description::{AppDescriptionGenerator, AppDescriptionRequest, AppListing};
use crate::chat::{ChatEngine, ChatSession};
use crate::conversation::SessionMemory;

const CHAT_PAGE: &str = include_str!("chat.html");

/// Sessions kept by default before the least recently used one is evicted
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

struct SessionSlot {
    session: Arc<AsyncMutex<ChatSession>>,
    last_used: Instant,
}

type SessionMap = HashMap<Uuid, SessionSlot>;

/// Shared state behind every handler
pub struct AppState {
    engine: ChatEngine,
    history_window: usize,
    max_sessions: usize,
    generator: Arc<AppDescriptionGenerator>,
    sessions: Mutex<SessionMap>,
}

impl AppState {
    #[inline]
    pub fn new(
        engine: ChatEngine,
        history_window: usize,
        generator: Arc<AppDescriptionGenerator>,
    ) -> Self {
        Self {
            engine,
            history_window,
            max_sessions: DEFAULT_MAX_SESSIONS,
            generator,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Cap the number of sessions held in memory; at least one is always kept.
    #[inline]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    fn sessions(&self) -> MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live chat sessions
    #[inline]
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Whether `id` is still held in memory
    #[inline]
    pub fn has_session(&self, id: Uuid) -> bool {
        self.sessions().contains_key(&id)
    }

    fn session(&self, id: Uuid) -> Arc<AsyncMutex<ChatSession>> {
        let mut sessions = self.sessions();
        let now = Instant::now();

        if let Some(slot) = sessions.get_mut(&id) {
            slot.last_used = now;
            return Arc::clone(&slot.session);
        }

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(oldest, _)| *oldest);
            let Some(oldest) = oldest else { break };
            debug!("Evicting idle chat session {}", oldest);
            sessions.remove(&oldest);
        }

        debug!("Starting chat session {}", id);
        let session = Arc::new(AsyncMutex::new(self.engine.session(
            SessionMemory::from_window_setting(self.history_window),
        )));
        sessions.insert(
            id,
            SessionSlot {
                session: Arc::clone(&session),
                last_used: now,
            },
        );
        session
    }

    fn end_session(&self, id: Uuid) -> bool {
        self.sessions().remove(&id).is_some()
    }
}

/// Build the router with tracing and permissive CORS.
#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/{session_id}", delete(handle_end_session))
        .route("/api/app-description", post(handle_app_description))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process is stopped.
#[inline]
pub async fn serve(state: Arc<AppState>, bind: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl From<SupportError> for AppError {
    fn from(err: SupportError) -> Self {
        let message = err.to_string();
        match err {
            SupportError::InvalidInput(_) => Self::bad_request(message),
            SupportError::Retrieval(_) | SupportError::Embedding(_) => Self {
                status: StatusCode::BAD_GATEWAY,
                code: "retrieval_failed",
                message,
            },
            SupportError::Completion(_) => Self {
                status: StatusCode::BAD_GATEWAY,
                code: "completion_failed",
                message,
            },
            _ => Self::internal(message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("Worker task failed: {}", err);
        Self::internal("Request worker failed")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

// ============ POST /api/chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatResponse {
    session_id: Uuid,
    reply: String,
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = body?;

    if request.message.trim().is_empty() {
        return Err(AppError::bad_request("Message must not be empty"));
    }

    let session_id = match request.session_id.as_deref() {
        Some(raw) => Uuid::parse_str(raw)
            .map_err(|e| AppError::bad_request(format!("Invalid session_id: {}", e)))?,
        None => Uuid::new_v4(),
    };

    // One turn at a time per session; other sessions are not blocked.
    let session = state.session(session_id).lock_owned().await;
    let reply = tokio::task::spawn_blocking(move || {
        let mut session = session;
        session.predict(&request.message)
    })
    .await??;

    Ok(Json(ChatResponse { session_id, reply }))
}

// ============ DELETE /api/chat/{session_id} ============

async fn handle_end_session(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<StatusCode, AppError> {
    let session_id = Uuid::parse_str(&raw)
        .map_err(|e| AppError::bad_request(format!("Invalid session_id: {}", e)))?;

    if state.end_session(session_id) {
        debug!("Ended chat session {}", session_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /api/app-description ============

async fn handle_app_description(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AppDescriptionRequest>, JsonRejection>,
) -> Result<Json<AppListing>, AppError> {
    let Json(request) = body?;
    let generator = Arc::clone(&state.generator);

    let listing = tokio::task::spawn_blocking(move || generator.generate(&request)).await??;
    Ok(Json(listing))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
