//! Top-K retrieval over the embedded corpus.
//!
//! `Retriever::build` embeds the corpus once at startup (reusing cached
//! vectors) and `Retriever::retrieve` embeds each query and ranks the corpus
//! by cosine similarity.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::cache::EmbeddingCache;
use super::corpus::document_id;
use super::store::{Document, DocumentIndex, RetrievalResult};
use crate::llm::{EmbeddingProvider, ProviderError};
use crate::vector_math::VectorError;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query must not be empty")]
    InvalidQuery,
    #[error("top_k must be at least 1")]
    InvalidTopK,
    #[error("embedding request failed: {0}")]
    Embedding(#[from] ProviderError),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding service returned {got} vectors for {expected} inputs")]
    VectorCount { expected: usize, got: usize },
    #[error("embedding shape error: {0}")]
    Vector(#[from] VectorError),
}

#[derive(Clone)]
pub struct Retriever {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    model: String,
    timeout: Duration,
}

/// How the corpus is embedded when building the index.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Retriever {
    pub fn new(
        index: DocumentIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            index: Arc::new(index),
            embedder,
            model: model.into(),
            timeout,
        }
    }

    /// Embeds `texts` (corpus order is preserved) and returns a ready
    /// retriever. When `cache_path` is given, cached vectors are reused and
    /// the cache is rewritten afterwards.
    pub async fn build(
        texts: Vec<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: &str,
        options: &IndexOptions,
        cache_path: Option<&Path>,
    ) -> Result<Self, RetrievalError> {
        let mut cache = match cache_path {
            Some(path) => Some(EmbeddingCache::load(path, model).await),
            None => None,
        };

        let mut embeddings: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| cache.as_ref().and_then(|c| c.get(text)).cloned())
            .collect();
        let missing: Vec<usize> = embeddings
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_none())
            .map(|(idx, _)| idx)
            .collect();

        tracing::info!(
            "Embedding {} of {} documents ({} cached)",
            missing.len(),
            texts.len(),
            texts.len() - missing.len()
        );

        for batch in missing.chunks(options.batch_size.max(1)) {
            let inputs: Vec<String> = batch.iter().map(|&idx| texts[idx].clone()).collect();
            let vectors = embed_with_timeout(embedder.as_ref(), &inputs, model, options.timeout).await?;
            for (&idx, vector) in batch.iter().zip(vectors) {
                embeddings[idx] = Some(vector);
            }
        }

        let documents: Vec<Document> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (text, embedding))| Document {
                id: document_id(position),
                text,
                embedding: embedding.unwrap_or_default(),
            })
            .collect();
        let index = DocumentIndex::new(documents)?;

        if let Some(cache) = cache.as_mut() {
            if !missing.is_empty() || cache.len() != index.len() {
                cache.replace_all(
                    index
                        .documents()
                        .iter()
                        .map(|doc| (doc.text.as_str(), doc.embedding.as_slice())),
                );
                if let Err(err) = cache.save().await {
                    tracing::warn!("Failed to write embedding cache: {}", err);
                }
            }
        }

        tracing::info!("Loaded {} documents into the retrieval index", index.len());
        Ok(Self::new(index, embedder, model, options.timeout))
    }

    pub fn document_count(&self) -> usize {
        self.index.len()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the `top_k` most similar documents, best first. Never
    /// returns an empty result to hide a failed embedding call.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResult, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery);
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        if self.index.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let inputs = [query.to_string()];
        let mut vectors =
            embed_with_timeout(self.embedder.as_ref(), &inputs, &self.model, self.timeout).await?;
        let query_embedding = vectors.pop().unwrap_or_default();

        Ok(self.index.search(&query_embedding, top_k)?)
    }
}

async fn embed_with_timeout(
    embedder: &dyn EmbeddingProvider,
    inputs: &[String],
    model: &str,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, RetrievalError> {
    let vectors = tokio::time::timeout(timeout, embedder.embed(inputs, model))
        .await
        .map_err(|_| RetrievalError::Timeout(timeout))??;
    if vectors.len() != inputs.len() {
        return Err(RetrievalError::VectorCount {
            expected: inputs.len(),
            got: vectors.len(),
        });
    }
    Ok(vectors)
}
