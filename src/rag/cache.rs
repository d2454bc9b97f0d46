//! On-disk cache of corpus embeddings.
//!
//! Entries are keyed by the SHA-256 of the document text and scoped to one
//! embedding model, so edits to `documents.txt` only re-embed what changed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    model: String,
    entries: HashMap<String, Vec<f32>>,
}

#[derive(Debug)]
pub struct EmbeddingCache {
    path: PathBuf,
    model: String,
    entries: HashMap<String, Vec<f32>>,
}

pub fn text_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl EmbeddingCache {
    /// A missing, unreadable, or other-model cache starts empty.
    pub async fn load(path: &Path, model: &str) -> Self {
        let entries = match tokio::fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str::<CacheFile>(&contents) {
                Ok(file) if file.model == model => file.entries,
                Ok(file) => {
                    tracing::info!(
                        "Embedding cache built with '{}', current model is '{}'; ignoring it",
                        file.model,
                        model
                    );
                    HashMap::new()
                }
                Err(err) => {
                    tracing::warn!("Embedding cache at {} is corrupt: {}", path.display(), err);
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                tracing::warn!("Failed to read embedding cache {}: {}", path.display(), err);
                HashMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            model: model.to_string(),
            entries,
        }
    }

    pub fn get(&self, text: &str) -> Option<&Vec<f32>> {
        self.entries.get(&text_digest(text))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the cached set with exactly the given documents, dropping
    /// entries for snippets no longer in the corpus.
    pub fn replace_all<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        self.entries = items
            .into_iter()
            .map(|(text, embedding)| (text_digest(text), embedding.to_vec()))
            .collect();
    }

    pub async fn save(&self) -> std::io::Result<()> {
        let file = CacheFile {
            model: self.model.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string(&file)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a crash never leaves a half-written cache.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
