use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chat_store::{DOCUMENT_LIST_LIMIT, DocumentKind, DocumentRecord, NewDocument};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::auth::UserId;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocument {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

pub(crate) fn parse_document_id(raw: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest("Invalid document ID format".into()))
}

fn parse_kind(raw: &str) -> Result<DocumentKind, ApiError> {
    raw.trim().parse::<DocumentKind>().map_err(ApiError::BadRequest)
}

// POST /api/document
pub async fn create_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateDocument>,
) -> Result<(StatusCode, Json<DocumentRecord>), ApiError> {
    let title = request
        .title
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Title is required".into()))?;
    let kind = match request.kind.as_deref() {
        Some(raw) => parse_kind(raw)?,
        None => DocumentKind::default(),
    };

    let document = state
        .documents
        .create_document(NewDocument {
            user_id,
            title,
            content: request.content.unwrap_or_default(),
            kind,
        })
        .await?;
    info!(document_id = %document.id, kind = %document.kind, "document created");
    Ok((StatusCode::CREATED, Json(document)))
}

// GET /api/document?kind=&limit=
pub async fn list_documents(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(parse_kind)
        .transpose()?;
    let documents = state
        .documents
        .documents_for_user(&user_id, kind, query.limit.unwrap_or(DOCUMENT_LIST_LIMIT))
        .await?;
    Ok(Json(json!({ "documents": documents })))
}

// GET /api/document/{id}
pub async fn get_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    state
        .documents
        .document(document_id, &user_id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::document_not_found)
}

// PUT /api/document/{id}
pub async fn update_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(document_id): Path<String>,
    Json(request): Json<UpdateDocument>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let content = request
        .content
        .ok_or_else(|| ApiError::BadRequest("Content is required".into()))?;
    let document_id = parse_document_id(&document_id)?;
    state
        .documents
        .update_document(document_id, &user_id, content)
        .await?
        .map(Json)
        .ok_or_else(ApiError::document_not_found)
}

// DELETE /api/document/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let document_id = parse_document_id(&document_id)?;
    if !state.documents.delete_document(document_id, &user_id).await? {
        return Err(ApiError::document_not_found());
    }
    info!(%document_id, "document deleted");
    Ok(Json(json!({ "success": true, "id": document_id })))
}
