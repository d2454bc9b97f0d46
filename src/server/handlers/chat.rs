use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::utils::resolve_client_identity;
use crate::chat::ChatInput;
use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::state::AppState;

/// Either a single `message` or the full `messages` conversation.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub client_key: Option<String>,
}

impl ChatBody {
    fn into_input(self) -> Result<ChatInput, ApiError> {
        match (self.messages, self.message) {
            (Some(messages), _) => Ok(ChatInput::Messages(messages)),
            (None, Some(message)) => Ok(ChatInput::Message(message)),
            (None, None) => Err(ApiError::BadRequest("Message is required".to_string())),
        }
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let client = resolve_client_identity(
        body.client_key.as_deref(),
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
    );
    let input = body.into_input()?;

    let reply = state.chat.handle(&client, input).await?;

    Ok(Json(json!({
        "reply": reply.reply,
        "text": reply.reply,
        "timestamp": reply.timestamp.to_rfc3339(),
    })))
}
