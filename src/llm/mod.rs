pub mod provider;
pub mod service;
pub mod together;
pub mod types;

pub use provider::{CompletionProvider, EmbeddingProvider, ProviderError};
pub use service::{CompletionError, CompletionService};
pub use together::TogetherClient;
pub use types::{ChatMessage, ChatRequest, Role};
