use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::presented_history_key;
use crate::history::HistoryError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub key: Option<String>,
    pub client_key: Option<String>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let secret = presented_history_key(&headers, query.key.as_deref());
    let records = state
        .history
        .read(query.client_key.as_deref(), secret.as_deref())
        .await
        .map_err(|err| {
            match &err {
                HistoryError::Unauthorized => tracing::warn!("Rejected history read with invalid key"),
                HistoryError::NotConfigured => {
                    tracing::error!("History read attempted but HISTORY_KEY is not set")
                }
                other => tracing::error!("Failed to read history: {}", other),
            }
            ApiError::from(err)
        })?;

    Ok(Json(json!({ "history": records })))
}
