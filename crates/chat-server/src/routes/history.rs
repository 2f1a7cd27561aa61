use axum::Json;
use axum::extract::State;
use chat_store::CHAT_LIST_LIMIT;
use serde_json::{Value, json};

use crate::auth::UserId;
use crate::error::ApiError;
use crate::state::AppState;

// GET /api/history
pub async fn list_chats(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Value>, ApiError> {
    let chats = state.store.chats_for_user(&user_id, CHAT_LIST_LIMIT).await?;
    Ok(Json(json!({ "chats": chats })))
}
