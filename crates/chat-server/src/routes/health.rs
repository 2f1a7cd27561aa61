use axum::Json;
use axum::extract::State;
use chat_stream::ModelInfo;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_host: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Models {
    pub models: Vec<ModelInfo>,
    pub default: Option<String>,
}

// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        ollama_host: state.ollama_host.clone(),
    })
}

// GET /api/health/models
pub async fn list_models(State(state): State<AppState>) -> Json<Models> {
    let catalog = state.coordinator.registry().catalog();
    Json(Models {
        models: catalog.models().to_vec(),
        default: catalog.default_model().map(str::to_string),
    })
}
