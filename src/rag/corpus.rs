use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read corpus at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reads the corpus file and splits it into snippets.
pub async fn load_corpus(path: &Path) -> Result<Vec<String>, CorpusError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
    Ok(split_corpus(&content))
}

/// Snippets are separated by `---`; surrounding whitespace is dropped and
/// empty snippets are skipped.
pub fn split_corpus(content: &str) -> Vec<String> {
    content
        .split("---")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn document_id(position: usize) -> String {
    format!("doc-{:04}", position)
}
