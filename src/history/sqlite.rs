use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Row, SqlitePool};

use super::{ConversationTurn, HistoryBackend, HistoryError, HistoryRecord};

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub async fn open(db_path: &Path) -> Result<Self, HistoryError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_key TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_client_key ON turns(client_key)")
            .execute(&pool)
            .await?;

        tracing::info!("History database opened at {}", db_path.display());
        Ok(Self { pool })
    }
}

fn record_from_row(row: &SqliteRow) -> Result<HistoryRecord, HistoryError> {
    let role: String = row.try_get("role")?;
    let timestamp: String = row.try_get("timestamp")?;
    Ok(HistoryRecord {
        client_key: row.try_get("client_key")?,
        turn: ConversationTurn {
            role: role.parse().map_err(HistoryError::Corrupt)?,
            text: row.try_get("text")?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| HistoryError::Corrupt(e.to_string()))?
                .with_timezone(&Utc),
        },
    })
}

#[async_trait]
impl HistoryBackend for SqliteHistoryStore {
    async fn append_turns(
        &self,
        client_key: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), HistoryError> {
        let mut tx = self.pool.begin().await?;
        for turn in turns {
            sqlx::query(
                "INSERT INTO turns (client_key, role, text, timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(client_key)
            .bind(turn.role.as_str())
            .bind(&turn.text)
            .bind(turn.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn conversation(&self, client_key: &str) -> Result<Vec<ConversationTurn>, HistoryError> {
        let rows = sqlx::query("SELECT * FROM turns WHERE client_key = ? ORDER BY id ASC")
            .bind(client_key)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| record_from_row(row).map(|record| record.turn))
            .collect()
    }

    async fn all(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let rows = sqlx::query("SELECT * FROM turns ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
