//! In-memory document index for the fixed persona corpus.
//!
//! The corpus is small (tens to hundreds of snippets), so search is a
//! brute-force cosine scan over every document.

use std::sync::Arc;

use crate::vector_math::{rank_descending_by_cosine, VectorError};

/// An indexed corpus entry. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Arc<Document>,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Ranked retrieval output: descending score, ties in corpus order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<ScoredDocument>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredDocument>) -> Self {
        Self { hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[ScoredDocument] {
        &self.hits
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|hit| hit.document.text.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    documents: Vec<Arc<Document>>,
}

impl DocumentIndex {
    /// All embeddings must share one dimension.
    pub fn new(documents: Vec<Document>) -> Result<Self, VectorError> {
        if let Some(first) = documents.first() {
            let dim = first.embedding.len();
            if dim == 0 {
                return Err(VectorError::Empty);
            }
            if let Some(bad) = documents.iter().find(|doc| doc.embedding.len() != dim) {
                return Err(VectorError::LengthMismatch(dim, bad.embedding.len()));
            }
        }

        Ok(Self {
            documents: documents.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.documents.first().map(|doc| doc.embedding.len())
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<RetrievalResult, VectorError> {
        if self.documents.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let candidates: Vec<&[f32]> = self
            .documents
            .iter()
            .map(|doc| doc.embedding.as_slice())
            .collect();
        let ranked = rank_descending_by_cosine(query_embedding, &candidates)?;

        let hits = ranked
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| ScoredDocument {
                document: self.documents[idx].clone(),
                score,
            })
            .collect();
        Ok(RetrievalResult::new(hits))
    }
}
