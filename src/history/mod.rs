//! Conversation history.
//!
//! Turns are appended per client key by the chat service. Reading the log
//! back over HTTP requires the shared `HISTORY_KEY` secret.

mod jsonl;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::errors::ApiError;
use crate::core::security::HistoryKey;
use crate::llm::{ChatMessage, Role};

pub use jsonl::JsonlHistoryStore;
pub use sqlite::SqliteHistoryStore;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history secret rejected")]
    Unauthorized,
    #[error("history key is not configured")]
    NotConfigured,
    #[error("history file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("history database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt history row: {0}")]
    Corrupt(String),
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::Unauthorized => ApiError::Unauthorized,
            HistoryError::NotConfigured => ApiError::NotConfigured,
            other => ApiError::internal(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.text.clone())
    }
}

/// One stored turn together with the client it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub client_key: String,
    #[serde(flatten)]
    pub turn: ConversationTurn,
}

#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Stores `turns` as one unit: concurrent writers for the same client
    /// never land between them and a failure stores none of them.
    async fn append_turns(
        &self,
        client_key: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), HistoryError>;

    /// Turns for one client, oldest first.
    async fn conversation(&self, client_key: &str) -> Result<Vec<ConversationTurn>, HistoryError>;

    /// Every stored turn in append order.
    async fn all(&self) -> Result<Vec<HistoryRecord>, HistoryError>;
}

#[derive(Clone)]
pub struct HistoryStore {
    backend: Arc<dyn HistoryBackend>,
    key: Option<HistoryKey>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>, key: Option<HistoryKey>) -> Self {
        Self { backend, key }
    }

    pub fn is_read_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Records a completed exchange, keeping its turns adjacent.
    pub async fn append_turns(
        &self,
        client_key: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), HistoryError> {
        if turns.is_empty() {
            return Ok(());
        }
        self.backend.append_turns(client_key, turns).await
    }

    /// Ungated accessor used to build prompts.
    pub async fn conversation(&self, client_key: &str) -> Result<Vec<ConversationTurn>, HistoryError> {
        self.backend.conversation(client_key).await
    }

    /// Gated read. Without a client key the whole log is returned.
    pub async fn read(
        &self,
        client_key: Option<&str>,
        secret: Option<&str>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let key = self.key.as_ref().ok_or(HistoryError::NotConfigured)?;
        if !key.verify(secret.unwrap_or_default()) {
            return Err(HistoryError::Unauthorized);
        }

        match client_key {
            Some(client_key) => Ok(self
                .backend
                .conversation(client_key)
                .await?
                .into_iter()
                .map(|turn| HistoryRecord {
                    client_key: client_key.to_string(),
                    turn,
                })
                .collect()),
            None => self.backend.all().await,
        }
    }
}
