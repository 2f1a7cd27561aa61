use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use chat_store::{MESSAGE_HISTORY_LIMIT, NewChat, Visibility};
use chat_stream::transport::SSE_HEADERS;
use chat_stream::{ChatMessage, GenerationRequest, MessagePart, NewMessage, Role};
use futures::StreamExt as _;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::auth::UserId;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default = "user_role")]
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default)]
    pub attachments: Vec<Value>,
}

fn user_role() -> Role {
    Role::User
}

impl IncomingMessage {
    fn text(&self) -> String {
        self.parts.iter().filter_map(MessagePart::as_text).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
}

fn parse_chat_id(raw: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest("Invalid chat ID format".into()))
}

// POST /api/chat
pub async fn stream_reply(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let message = request
        .message
        .filter(|message| !message.parts.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Message is required".into()))?;
    // Reject unknown models before anything is written.
    state
        .coordinator
        .registry()
        .resolve(request.model_id.as_deref())?;

    // An unparseable or foreign chat id starts a new chat.
    let existing = match request
        .chat_id
        .as_deref()
        .and_then(|raw| uuid::Uuid::parse_str(raw.trim()).ok())
    {
        Some(chat_id) => state.store.chat(chat_id, &user_id).await?,
        None => None,
    };
    let chat = match existing {
        Some(chat) => chat,
        None => {
            let input = NewChat::from_opening_text(user_id.as_str(), &message.text())
                .visibility(request.visibility.unwrap_or_default());
            state.store.create_chat(input).await?
        }
    };

    state
        .store
        .add_message(NewMessage {
            chat_id: chat.id,
            role: message.role,
            parts: message.parts,
            attachments: message.attachments,
        })
        .await?;
    state.store.touch_chat(chat.id).await?;

    let history: Vec<ChatMessage> = state
        .store
        .messages(chat.id, MESSAGE_HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(|record| ChatMessage {
            role: record.role,
            parts: record.parts,
            attachments: record.attachments,
        })
        .collect();

    let mut generation = GenerationRequest::new(request.model_id.unwrap_or_default(), history);
    if let Some(system_prompt) = request.system_prompt {
        generation = generation.system_prompt(system_prompt);
    }
    let events = state.coordinator.start(chat.id, generation).await?;
    info!(
        chat_id = %chat.id,
        message_id = %events.message_id(),
        model = events.model(),
        "streaming reply"
    );

    let body = Body::from_stream(
        events
            .into_stream()
            .map(|unit| Ok::<_, Infallible>(unit.into_bytes())),
    );
    let mut response = Response::builder().status(StatusCode::OK);
    for (name, value) in SSE_HEADERS {
        response = response.header(name, value);
    }
    response
        .body(body)
        .map_err(|err| ApiError::Internal(format!("failed to build stream response: {err}")))
}

// GET /api/chat/{chat_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(chat_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    if state.store.chat(chat_id, &user_id).await?.is_none() {
        return Err(ApiError::chat_not_found());
    }
    let messages = state.store.messages(chat_id, MESSAGE_HISTORY_LIMIT).await?;
    Ok(Json(json!({ "messages": messages })))
}

// DELETE /api/chat?id=
pub async fn delete_chat(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Chat ID is required".into()))?;
    let chat_id = parse_chat_id(&raw)?;
    if !state.store.delete_chat(chat_id, &user_id).await? {
        return Err(ApiError::chat_not_found());
    }
    info!(%chat_id, "chat deleted");
    Ok(Json(json!({ "success": true, "id": chat_id })))
}
