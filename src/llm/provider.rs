use async_trait::async_trait;
use thiserror::Error;

use super::types::ChatRequest;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Network failures, throttling and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Malformed(_) => false,
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// provider name for logs (e.g. "together")
    fn name(&self) -> &str;

    /// non-streaming chat completion
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// one vector per input, same order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ProviderError>;
}
