use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use chat_store::SqliteChatStore;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::auth::USER_ID_HEADER;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::routes::{chat, documents, health, history, suggestions};
use crate::state::AppState;

/// Builds the HTTP router. An empty origin list (or `*`) allows any origin.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/health/models", get(health::list_models))
        .route(
            "/api/chat",
            post(chat::stream_reply).delete(chat::delete_chat),
        )
        .route("/api/chat/{chat_id}/messages", get(chat::list_messages))
        .route("/api/history", get(history::list_chats))
        .route(
            "/api/document",
            post(documents::create_document).get(documents::list_documents),
        )
        .route(
            "/api/document/{id}",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        )
        .route(
            "/api/suggestions/{id}",
            get(suggestions::list_suggestions).post(suggestions::create_suggestion),
        )
        .route(
            "/api/suggestions/{id}/resolve",
            post(suggestions::resolve_suggestion),
        )
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
        ]);

    let origins: Vec<&str> = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .collect();
    if origins.is_empty() || origins.contains(&"*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

/// Runs the server until ctrl-c.
pub async fn serve(config: ServerConfig) -> Result<(), AppError> {
    let registry = Arc::new(config.backend.build_registry()?);
    let store = Arc::new(SqliteChatStore::open(&config.database_url).await?);
    let state = AppState::new(registry, store.clone(), store)
        .with_stream_options(config.backend.stream_options())
        .with_ollama_host(config.backend.ollama_host.clone());
    let app = router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, database = %config.database_url, "chat server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("chat server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
