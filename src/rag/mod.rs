//! Retrieval-augmented context for chat replies.
//!
//! - `corpus`: loads and splits `documents.txt`
//! - `cache`: persists corpus embeddings between restarts
//! - `store`: in-memory document index and ranked results
//! - `retriever`: embeds queries and selects the top-K documents

pub mod cache;
pub mod corpus;
pub mod retriever;
pub mod store;

pub use corpus::{load_corpus, CorpusError};
pub use retriever::{IndexOptions, RetrievalError, Retriever};
pub use store::{Document, DocumentIndex, RetrievalResult, ScoredDocument};
