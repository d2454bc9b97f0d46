use thiserror::Error;

use crate::history::HistoryError;
use crate::rag::{CorpusError, RetrievalError};

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load system prompt from {path}: {source}")]
    SystemPrompt {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load corpus: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Failed to build retrieval index: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Failed to initialize history store: {0}")]
    History(#[from] HistoryError),
}
