use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chat_store::{NewSuggestion, SuggestionRecord};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::UserId;
use crate::error::ApiError;
use crate::routes::documents::parse_document_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub include_resolved: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSuggestion {
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub suggested_text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

async fn require_document(
    state: &AppState,
    document_id: uuid::Uuid,
    user_id: &str,
) -> Result<(), ApiError> {
    match state.documents.document(document_id, user_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::document_not_found()),
    }
}

// GET /api/suggestions/{document_id}?include_resolved=
pub async fn list_suggestions(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(document_id): Path<String>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    require_document(&state, document_id, &user_id).await?;
    let include_resolved = query
        .include_resolved
        .is_some_and(|raw| raw.trim().eq_ignore_ascii_case("true"));
    let suggestions = state
        .documents
        .suggestions(document_id, include_resolved)
        .await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

// POST /api/suggestions/{document_id}
pub async fn create_suggestion(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(document_id): Path<String>,
    Json(request): Json<CreateSuggestion>,
) -> Result<(StatusCode, Json<SuggestionRecord>), ApiError> {
    let document_id = parse_document_id(&document_id)?;
    let (Some(original_text), Some(suggested_text)) = (request.original_text, request.suggested_text)
    else {
        return Err(ApiError::BadRequest(
            "original_text and suggested_text are required".into(),
        ));
    };
    require_document(&state, document_id, &user_id).await?;

    let suggestion = state
        .documents
        .add_suggestion(NewSuggestion {
            document_id,
            user_id,
            original_text,
            suggested_text,
            description: request.description.filter(|d| !d.trim().is_empty()),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

// POST /api/suggestions/{suggestion_id}/resolve
pub async fn resolve_suggestion(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(suggestion_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let suggestion_id = uuid::Uuid::parse_str(suggestion_id.trim())
        .map_err(|_| ApiError::BadRequest("Invalid suggestion ID format".into()))?;
    if !state
        .documents
        .resolve_suggestion(suggestion_id, &user_id)
        .await?
    {
        return Err(ApiError::suggestion_not_found());
    }
    Ok(Json(json!({ "success": true, "id": suggestion_id })))
}
