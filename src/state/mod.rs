use std::sync::Arc;

use crate::chat::{ChatOptions, ChatService};
use crate::context::{PromptAssembler, PromptTemplate};
use crate::core::config::Settings;
use crate::core::logging::LogStats;
use crate::core::security::HistoryKey;
use crate::history::{HistoryBackend, HistoryStore, JsonlHistoryStore, SqliteHistoryStore};
use crate::llm::{CompletionProvider, CompletionService, EmbeddingProvider, TogetherClient};
use crate::rag::{load_corpus, IndexOptions, Retriever};
use crate::rate_limit::RateLimiter;

pub mod error;

use error::InitializationError;

/// Upstream model endpoints. Production uses one Together client for both.
#[derive(Clone)]
pub struct Providers {
    pub completion: Arc<dyn CompletionProvider>,
    pub embedding: Arc<dyn EmbeddingProvider>,
}

impl Providers {
    pub fn together(settings: &Settings) -> Self {
        let client = Arc::new(TogetherClient::new(
            settings.together_base_url.clone(),
            settings.together_api_key.clone(),
        ));
        Self {
            completion: client.clone(),
            embedding: client,
        }
    }
}

/// Application state shared across all routes and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub chat: ChatService,
    pub history: HistoryStore,
    pub retriever: Retriever,
    pub log_stats: LogStats,
}

impl AppState {
    pub async fn initialize(
        settings: Settings,
        log_stats: LogStats,
    ) -> Result<Arc<Self>, InitializationError> {
        let providers = Providers::together(&settings);
        Self::initialize_with(settings, log_stats, providers).await
    }

    /// Initializes the application state.
    ///
    /// 1. Loading the system prompt template and the corpus
    /// 2. Embedding the corpus (reusing the on-disk cache)
    /// 3. Opening the history backend
    /// 4. Wiring the rate limiter and completion service into the chat service
    pub async fn initialize_with(
        settings: Settings,
        log_stats: LogStats,
        providers: Providers,
    ) -> Result<Arc<Self>, InitializationError> {
        let paths = &settings.paths;

        let template = PromptTemplate::load(&paths.system_prompt)
            .await
            .map_err(|source| InitializationError::SystemPrompt {
                path: paths.system_prompt.display().to_string(),
                source,
            })?;

        let texts = load_corpus(&paths.documents).await?;
        if texts.is_empty() {
            tracing::warn!(
                "Corpus at {} has no documents; replies will have no context",
                paths.documents.display()
            );
        }
        let index_options = IndexOptions {
            batch_size: settings.embed_batch_size,
            timeout: settings.request_timeout,
        };
        let retriever = Retriever::build(
            texts,
            providers.embedding,
            &settings.embedding_model,
            &index_options,
            Some(&paths.index_cache),
        )
        .await?;

        let backend: Arc<dyn HistoryBackend> = match &paths.history_db {
            Some(db_path) => Arc::new(SqliteHistoryStore::open(db_path).await?),
            None => Arc::new(JsonlHistoryStore::open(paths.history_file.clone()).await?),
        };
        let history_key = settings.history_key.clone().map(HistoryKey::new);
        if history_key.is_none() {
            tracing::warn!("HISTORY_KEY is not set; the history endpoint is disabled");
        }
        let history = HistoryStore::new(backend, history_key);

        let completion = CompletionService::new(
            providers.completion,
            settings.request_timeout,
            settings.completion_max_retries,
        );
        let chat = ChatService::new(
            retriever.clone(),
            PromptAssembler::new(template),
            completion,
            RateLimiter::per_hour(settings.chat_requests_per_hour),
            history.clone(),
            ChatOptions {
                text_model: settings.text_model.clone(),
                top_k: settings.retrieve_top_k,
                max_chars: settings.max_chars,
            },
        );

        Ok(Arc::new(AppState {
            settings: Arc::new(settings),
            chat,
            history,
            retriever,
            log_stats,
        }))
    }
}
