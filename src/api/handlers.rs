//! HTTP request handlers

use super::auth::{AuthError, Identity};
use super::stream::live_response;
use super::types::{
    ChatRequest, ChatResponse, CreateThreadResponse, ErrorResponse, LoginRequest, LoginResponse,
    MessageResponse, RenameRequest, RenameResponse, SuccessResponse, ThreadSummary, UploadResponse,
};
use super::AppState;
use crate::db::{DbError, DEFAULT_THREAD_TITLE};
use crate::turn::{answer_once, spawn_turn, LiveChannel, TurnError};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;

/// Uploaded images may be larger than axum's default body limit
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Buffered live records per streaming turn
const LIVE_CHANNEL_CAPACITY: usize = 64;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        // Thread management
        .route("/threads", post(create_thread).get(list_threads))
        .route("/threads/:id", patch(rename_thread).delete(delete_thread))
        // Attachments
        .route("/upload", post(upload_image))
        // History
        .route("/messages/:id", get(get_messages))
        // Turns
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        // Version
        .route("/version", get(get_version))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

// ============================================================
// Login
// ============================================================

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let token = state.signer.login(&req.user, &req.key)?;
    tracing::info!(user = %req.user, "User logged in");
    Ok(Json(LoginResponse { token }))
}

// ============================================================
// Threads
// ============================================================

async fn create_thread(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<CreateThreadResponse>, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let thread = state.db.create_thread(&id, &identity.user, DEFAULT_THREAD_TITLE)?;

    Ok(Json(CreateThreadResponse {
        thread_id: thread.id,
        title: thread.title,
    }))
}

async fn list_threads(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<ThreadSummary>>, AppError> {
    let threads = state.db.list_threads(&identity.user)?;
    Ok(Json(threads.into_iter().map(ThreadSummary::from).collect()))
}

async fn rename_thread(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, AppError> {
    let title = state
        .db
        .rename_thread(&id, &identity.user, req.title.as_deref())?;
    Ok(Json(RenameResponse { ok: true, title }))
}

async fn delete_thread(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_thread(&id, &identity.user)?;
    tracing::info!(thread_id = %id, "Thread deleted");
    Ok(Json(SuccessResponse { ok: true }))
}

// ============================================================
// Upload
// ============================================================

async fn upload_image(
    State(state): State<AppState>,
    _identity: Identity,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let extension = field
            .file_name()
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .unwrap_or("png")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let url = state
            .turns
            .images
            .save(&bytes, &extension)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        return Ok(Json(UploadResponse { url }));
    }

    Err(AppError::BadRequest("Missing 'file' field".to_string()))
}

// ============================================================
// Messages
// ============================================================

async fn get_messages(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    state.db.get_thread_for_user(&id, &identity.user)?;
    let messages = state.db.get_messages(&id)?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

// ============================================================
// Chat
// ============================================================

async fn chat(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    state.db.get_thread_for_user(&req.thread_id, &identity.user)?;

    let committed = answer_once(&state.turns, &req.into_turn()).await?;
    Ok(Json(ChatResponse::from(committed.assistant)))
}

async fn chat_stream(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    // Ownership is settled before any turn work starts
    state.db.get_thread_for_user(&req.thread_id, &identity.user)?;

    let (live, records) = LiveChannel::new(LIVE_CHANNEL_CAPACITY);
    spawn_turn(Arc::clone(&state.turns), req.into_turn(), live);
    Ok(live_response(records))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("switchboard ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ThreadNotFound(_) => AppError::NotFound(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
