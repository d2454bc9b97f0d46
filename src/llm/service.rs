use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::llm::provider::{CompletionProvider, ProviderError};
use crate::llm::types::ChatRequest;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion failed after {attempts} attempt(s): {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("completion timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
}

/// Wraps a completion provider with a per-attempt timeout and a small,
/// bounded number of retries.
#[derive(Clone)]
pub struct CompletionService {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl CompletionService {
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            provider,
            timeout,
            max_retries,
            backoff: Duration::from_millis(250),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn complete(&self, request: ChatRequest) -> Result<String, CompletionError> {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.timeout, self.provider.chat(request.clone())).await;

            let retryable_err = match outcome {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(err)) if !err.is_retryable() => {
                    return Err(CompletionError::Upstream {
                        attempts: attempt,
                        source: err,
                    })
                }
                Ok(Err(err)) => Some(err),
                Err(_) => None,
            };

            if attempt >= max_attempts {
                return Err(match retryable_err {
                    Some(source) => CompletionError::Upstream {
                        attempts: attempt,
                        source,
                    },
                    None => CompletionError::Timeout { attempts: attempt },
                });
            }

            match &retryable_err {
                Some(err) => tracing::warn!(
                    provider = self.provider.name(),
                    attempt,
                    "Completion attempt failed, retrying: {}",
                    err
                ),
                None => tracing::warn!(
                    provider = self.provider.name(),
                    attempt,
                    "Completion attempt timed out, retrying"
                ),
            }
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}
