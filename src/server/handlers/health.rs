use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn index() -> impl IntoResponse {
    Json(json!({
        "name": "Giacomino chatbot API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /": "API description",
            "GET /status": "Service health and statistics",
            "POST /chat": "Send a message: {message} or {messages: [{role, content}]}",
            "GET /history": "Saved conversations (requires the history key)",
        }
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = &state.settings;
    let environment = if settings.deploy_env.is_development() {
        "development"
    } else {
        "production"
    };
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "model_loaded": true,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": environment,
        "text_model": settings.text_model,
        "embedding_model": state.retriever.model(),
        "documents_available": state.retriever.document_count(),
        "history_enabled": state.history.is_read_enabled(),
        "rate_limit_per_hour": state.chat.limiter().limit(),
        "logging": state.log_stats.snapshot(),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}
