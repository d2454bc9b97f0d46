use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{ConversationTurn, HistoryBackend, HistoryError, HistoryRecord};

/// Append-only newline-delimited JSON log, mirrored in memory.
pub struct JsonlHistoryStore {
    path: PathBuf,
    records: Mutex<Vec<HistoryRecord>>,
}

impl JsonlHistoryStore {
    /// Opens the log, restoring any turns already on disk. Lines that fail to
    /// parse are skipped with a warning.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_log(&path, &contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            "History log {} opened with {} turns",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }
}

fn parse_log(path: &Path, contents: &str) -> Vec<HistoryRecord> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str::<HistoryRecord>(line) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("Skipping {} line {}: {}", path.display(), idx + 1, err);
                None
            }
        })
        .collect()
}

#[async_trait]
impl HistoryBackend for JsonlHistoryStore {
    async fn append_turns(
        &self,
        client_key: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), HistoryError> {
        let batch: Vec<HistoryRecord> = turns
            .iter()
            .map(|turn| HistoryRecord {
                client_key: client_key.to_string(),
                turn: turn.clone(),
            })
            .collect();
        let mut lines = String::new();
        for record in &batch {
            lines.push_str(&serde_json::to_string(record)?);
            lines.push('\n');
        }

        // The lock covers the file write so batches never interleave.
        let mut records = self.records.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        records.extend(batch);
        Ok(())
    }

    async fn conversation(&self, client_key: &str) -> Result<Vec<ConversationTurn>, HistoryError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| record.client_key == client_key)
            .map(|record| record.turn.clone())
            .collect())
    }

    async fn all(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(self.records.lock().await.clone())
    }
}
