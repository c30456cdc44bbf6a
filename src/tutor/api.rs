use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::Deserialize;
use tracing::{error, info};

use super::db::DbHandle;
use super::engine::TurnEngine;
use super::models::{Conversation, Page, Role, SortOrder};
use crate::config::DialogueSettings;
use crate::errors::TurnError;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";
const DEFAULT_PAGE_SIZE: usize = 50;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub engine: TurnEngine,
    pub dialogue: DialogueSettings,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct MessageBody {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: MessageBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::BadRequest(msg) => ApiError::BadRequest(msg),
            TurnError::ConversationNotFound { id } => {
                ApiError::NotFound(format!("Conversation {} not found", id))
            }
            TurnError::OracleUnavailable(e) => {
                error!(error = %e, "turn failed: oracle unavailable");
                ApiError::Unavailable(GENERIC_FAILURE.to_string())
            }
            TurnError::Persistence(e) => {
                error!(error = ?e, "turn failed: message log");
                ApiError::Internal(GENERIC_FAILURE.to_string())
            }
        }
    }
}

/// Log a store failure and hide its details from the client.
fn internal(err: anyhow::Error) -> ApiError {
    error!(error = ?err, "request failed");
    ApiError::Internal(GENERIC_FAILURE.to_string())
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Fetch a conversation, treating one owned by someone else as missing.
async fn find_conversation(
    state: &AppState,
    id: i64,
    user_id: Option<&str>,
) -> Result<Conversation, ApiError> {
    let conversation = state
        .db
        .call(move |db| db.get_conversation(id))
        .await
        .map_err(internal)?;
    match conversation {
        Some(c) if user_id.is_none_or(|u| u == c.user_id) => Ok(c),
        _ => Err(TurnError::ConversationNotFound { id }.into()),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_conversation(
    State(state): State<SharedState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required(&req.user_id, "userId")?;
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| state.dialogue.default_title.clone());
    let greeting = state.dialogue.greeting.clone();

    let conversation = state
        .db
        .call(move |db| {
            let conversation = db.create_conversation(&user_id, &title)?;
            db.append_message(conversation.id, Role::Chatbot, &greeting)?;
            Ok(conversation)
        })
        .await
        .map_err(internal)?;
    info!(conversation_id = conversation.id, "conversation created");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "conversationId": conversation.id,
            "conversation": conversation,
        })),
    ))
}

async fn list_conversations(
    State(state): State<SharedState>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required(query.user_id.as_deref().unwrap_or_default(), "userId")?;
    let conversations = state
        .db
        .call(move |db| db.list_conversations(&user_id))
        .await
        .map_err(internal)?;
    Ok(Json(conversations))
}

async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let order = match query.order.as_deref() {
        Some(order) => order.parse::<SortOrder>().map_err(ApiError::BadRequest)?,
        None => SortOrder::Desc,
    };
    let page = Page {
        limit: Some(query.limit.unwrap_or(DEFAULT_PAGE_SIZE)),
        offset: query.offset.unwrap_or(0),
        order,
    };

    find_conversation(&state, id, query.user_id.as_deref()).await?;
    let messages = state
        .db
        .call(move |db| db.list_messages(id, page))
        .await
        .map_err(internal)?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required(&req.user_id, "userId")?;
    required(&req.message.content, "message content")?;

    find_conversation(&state, id, Some(&user_id)).await?;
    let reply = state
        .engine
        .handle_user_turn(id, &user_id, &req.message.content)
        .await?;
    Ok(Json(serde_json::json!({ "response": reply })))
}

async fn delete_conversation(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    find_conversation(&state, id, query.user_id.as_deref()).await?;

    let _guard = state.engine.locks().acquire(id).await;
    let deleted = state
        .db
        .call(move |db| db.delete_conversation(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(TurnError::ConversationNotFound { id }.into());
    }
    info!(conversation_id = id, "conversation deleted");
    Ok(Json(serde_json::json!({ "conversationId": id })))
}
