//! One chat request end to end: rate limit, retrieve, assemble, complete,
//! record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::context::{format_prompt_date, PromptAssembler, PromptInputs};
use crate::core::errors::ApiError;
use crate::history::{ConversationTurn, HistoryStore};
use crate::llm::{ChatMessage, ChatRequest, CompletionError, CompletionService, Role};
use crate::rag::{RetrievalResult, Retriever};
use crate::rate_limit::RateLimiter;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("chat pipeline failed: {0}")]
    Internal(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::RateLimited => ApiError::TooManyRequests,
            ChatError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ChatError::Completion(CompletionError::Timeout { .. }) => ApiError::GatewayTimeout,
            ChatError::Completion(err) => ApiError::BadGateway(err.to_string()),
            ChatError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

/// What the client sent.
#[derive(Debug, Clone)]
pub enum ChatInput {
    /// A single message; prior turns come from stored history.
    Message(String),
    /// A full conversation ending with the new user message.
    Messages(Vec<ChatMessage>),
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

/// Who a request is from. Every request has a rate-limit key; stored
/// history is only read and written under a key the client chose itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub rate_key: String,
    pub history_key: Option<String>,
}

impl ClientIdentity {
    /// A client that sent its own `client_key`.
    pub fn keyed(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            rate_key: key.clone(),
            history_key: Some(key),
        }
    }

    /// A client known only by its address. Its requests are stateless.
    pub fn anonymous(rate_key: impl Into<String>) -> Self {
        Self {
            rate_key: rate_key.into(),
            history_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub text_model: String,
    pub top_k: usize,
    pub max_chars: usize,
}

#[derive(Clone)]
pub struct ChatService {
    retriever: Retriever,
    assembler: Arc<PromptAssembler>,
    completion: CompletionService,
    limiter: RateLimiter,
    history: HistoryStore,
    options: Arc<ChatOptions>,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        completion: CompletionService,
        limiter: RateLimiter,
        history: HistoryStore,
        options: ChatOptions,
    ) -> Self {
        Self {
            retriever,
            assembler: Arc::new(assembler),
            completion,
            limiter,
            history,
            options: Arc::new(options),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn handle(&self, client: &ClientIdentity, input: ChatInput) -> Result<ChatReply, ChatError> {
        let (message, supplied) = split_input(input)?;

        if !self.limiter.allow(&client.rate_key) {
            return Err(ChatError::RateLimited);
        }

        // Detached so a client disconnect doesn't cancel the completion.
        let service = self.clone();
        let client = client.clone();
        tokio::spawn(async move { service.run(&client, message, supplied).await })
            .await
            .map_err(|e| ChatError::Internal(e.to_string()))?
    }

    async fn run(
        &self,
        client: &ClientIdentity,
        message: String,
        supplied: Option<Vec<ChatMessage>>,
    ) -> Result<ChatReply, ChatError> {
        let client_key = client.rate_key.as_str();
        let conversation = match (supplied, client.history_key.as_deref()) {
            (Some(conversation), _) => conversation,
            (None, Some(history_key)) => match self.history.conversation(history_key).await {
                Ok(turns) => turns.iter().map(ConversationTurn::to_message).collect(),
                Err(err) => {
                    tracing::warn!(client_key = %client_key, "History unavailable, continuing without it: {}", err);
                    Vec::new()
                }
            },
            (None, None) => Vec::new(),
        };

        let retrieval = match self.retriever.retrieve(&message, self.options.top_k).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(client_key = %client_key, "Retrieval failed, answering without context: {}", err);
                RetrievalResult::empty()
            }
        };

        let date = format_prompt_date(Utc::now().date_naive());
        let prompt = self.assembler.assemble(PromptInputs {
            conversation: &conversation,
            retrieval: &retrieval,
            message: &message,
            max_chars: self.options.max_chars,
            date: &date,
        });
        tracing::debug!(
            client_key = %client_key,
            documents = prompt.documents_used,
            turns_dropped = prompt.turns_dropped,
            chars = prompt.char_len(),
            "Prompt assembled"
        );

        let request =
            ChatRequest::new(self.options.text_model.clone(), prompt.to_messages()).with_default_sampling();
        let reply = self.completion.complete(request).await.map_err(|err| {
            tracing::error!(client_key = %client_key, "Completion failed: {}", err);
            ChatError::from(err)
        })?;

        let user_turn = ConversationTurn::new(Role::User, message);
        let assistant_turn = ConversationTurn::new(Role::Assistant, reply.clone());
        let timestamp = assistant_turn.timestamp;
        if let Some(history_key) = client.history_key.as_deref() {
            if let Err(err) = self
                .history
                .append_turns(history_key, &[user_turn, assistant_turn])
                .await
            {
                tracing::warn!(client_key = %client_key, "Failed to record exchange: {}", err);
            }
        }

        tracing::info!(client_key = %client_key, "Chat reply sent");
        Ok(ChatReply { reply, timestamp })
    }
}

/// Pulls the new user message out of the request. For a supplied
/// conversation, everything before the last message becomes history.
fn split_input(input: ChatInput) -> Result<(String, Option<Vec<ChatMessage>>), ChatError> {
    match input {
        ChatInput::Message(message) => {
            if message.trim().is_empty() {
                return Err(ChatError::InvalidRequest("Message is required".to_string()));
            }
            Ok((message, None))
        }
        ChatInput::Messages(mut messages) => {
            let last = messages
                .pop()
                .ok_or_else(|| ChatError::InvalidRequest("Messages must not be empty".to_string()))?;
            if last.role != Role::User {
                return Err(ChatError::InvalidRequest(
                    "Last message must come from the user".to_string(),
                ));
            }
            if last.content.trim().is_empty() {
                return Err(ChatError::InvalidRequest("Message is required".to_string()));
            }
            Ok((last.content, Some(messages)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PromptTemplate;
    use crate::history::{HistoryBackend, JsonlHistoryStore};
    use crate::llm::{CompletionProvider, EmbeddingProvider, ProviderError};
    use crate::rag::{Document, DocumentIndex};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    if text.contains("guitar") {
                        vec![0.0, 1.0]
                    } else {
                        vec![1.0, 0.0]
                    }
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Transport("down".into()))
        }
    }

    /// Replies "Ciao!" (or echoes the last user message) and keeps every
    /// request it saw.
    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<ChatRequest>>,
        fail: bool,
        echo: bool,
    }

    #[async_trait]
    impl CompletionProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.seen.lock().unwrap().push(request);
            if self.echo {
                tokio::task::yield_now().await;
                Ok(format!("re: {}", last))
            } else if self.fail {
                Err(ProviderError::Status {
                    status: 400,
                    body: "bad".into(),
                })
            } else {
                Ok("Ciao!".to_string())
            }
        }
    }

    struct Fixture {
        service: ChatService,
        provider: Arc<RecordingProvider>,
        history: Arc<JsonlHistoryStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(embedder: Arc<dyn EmbeddingProvider>, limit: u64, fail: bool) -> Fixture {
        fixture_with(
            embedder,
            limit,
            RecordingProvider {
                fail,
                ..Default::default()
            },
        )
        .await
    }

    async fn fixture_with(
        embedder: Arc<dyn EmbeddingProvider>,
        limit: u64,
        provider: RecordingProvider,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(
            JsonlHistoryStore::open(dir.path().join("history.jsonl"))
                .await
                .unwrap(),
        );
        let provider = Arc::new(provider);

        let index = DocumentIndex::new(vec![
            Document {
                id: "doc-0000".into(),
                text: "Giacomo plays guitar.".into(),
                embedding: vec![0.0, 1.0],
            },
            Document {
                id: "doc-0001".into(),
                text: "Giacomo codes.".into(),
                embedding: vec![1.0, 0.0],
            },
        ])
        .unwrap();
        let retriever = Retriever::new(index, embedder, "emb", Duration::from_secs(1));

        let service = ChatService::new(
            retriever,
            PromptAssembler::new(PromptTemplate::new("Facts:\n{context}")),
            CompletionService::new(provider.clone(), Duration::from_secs(1), 0),
            RateLimiter::per_hour(limit),
            HistoryStore::new(history.clone(), None),
            ChatOptions {
                text_model: "text".into(),
                top_k: 1,
                max_chars: 1000,
            },
        );
        Fixture {
            service,
            provider,
            history,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn reply_is_grounded_and_recorded() {
        let f = fixture(Arc::new(KeywordEmbedder), 10, false).await;

        let reply = f
            .service
            .handle(&ClientIdentity::keyed("alice"), ChatInput::Message("Do you play guitar?".into()))
            .await
            .unwrap();
        assert_eq!(reply.reply, "Ciao!");

        let seen = f.provider.seen.lock().unwrap();
        let system = &seen[0].messages[0];
        assert_eq!(system.role, Role::System);
        assert_eq!(system.content, "Facts:\nGiacomo plays guitar.");
        assert_eq!(seen[0].max_tokens, Some(512));

        let turns = f.history.conversation("alice").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "Do you play guitar?");
        assert_eq!(turns[1].text, "Ciao!");
    }

    #[tokio::test]
    async fn stored_history_feeds_the_next_prompt() {
        let f = fixture(Arc::new(KeywordEmbedder), 10, false).await;

        f.service
            .handle(&ClientIdentity::keyed("alice"), ChatInput::Message("first".into()))
            .await
            .unwrap();
        f.service
            .handle(&ClientIdentity::keyed("alice"), ChatInput::Message("second".into()))
            .await
            .unwrap();

        let seen = f.provider.seen.lock().unwrap();
        let contents: Vec<&str> = seen[1].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["first", "Ciao!", "second"]);
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_no_context() {
        let f = fixture(Arc::new(FailingEmbedder), 10, false).await;

        let reply = f
            .service
            .handle(&ClientIdentity::keyed("bob"), ChatInput::Message("hello".into()))
            .await
            .unwrap();
        assert_eq!(reply.reply, "Ciao!");

        let seen = f.provider.seen.lock().unwrap();
        assert_eq!(
            seen[0].messages[0].content,
            "Facts:\nNo specific context available."
        );
    }

    #[tokio::test]
    async fn limit_is_enforced_per_client() {
        let f = fixture(Arc::new(KeywordEmbedder), 1, false).await;

        f.service
            .handle(&ClientIdentity::keyed("a"), ChatInput::Message("hi".into()))
            .await
            .unwrap();
        assert!(matches!(
            f.service.handle(&ClientIdentity::keyed("a"), ChatInput::Message("hi".into())).await,
            Err(ChatError::RateLimited)
        ));
        assert!(f.service.handle(&ClientIdentity::keyed("b"), ChatInput::Message("hi".into())).await.is_ok());
    }

    #[tokio::test]
    async fn supplied_conversation_replaces_stored_history() {
        let f = fixture(Arc::new(KeywordEmbedder), 10, false).await;
        let messages = vec![
            ChatMessage::new(Role::User, "earlier"),
            ChatMessage::new(Role::Assistant, "sure"),
            ChatMessage::new(Role::User, "now"),
        ];

        f.service
            .handle(&ClientIdentity::keyed("c"), ChatInput::Messages(messages))
            .await
            .unwrap();

        let seen = f.provider.seen.lock().unwrap();
        let contents: Vec<&str> = seen[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["earlier", "sure", "now"]);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_without_spending_quota() {
        let f = fixture(Arc::new(KeywordEmbedder), 1, false).await;

        for input in [
            ChatInput::Message("   ".into()),
            ChatInput::Messages(vec![]),
            ChatInput::Messages(vec![ChatMessage::new(Role::Assistant, "hi")]),
        ] {
            assert!(matches!(
                f.service.handle(&ClientIdentity::keyed("a"), input).await,
                Err(ChatError::InvalidRequest(_))
            ));
        }
        assert!(f.service.handle(&ClientIdentity::keyed("a"), ChatInput::Message("hi".into())).await.is_ok());
    }

    #[tokio::test]
    async fn completion_failure_is_not_recorded() {
        let f = fixture(Arc::new(KeywordEmbedder), 10, true).await;

        let err = f
            .service
            .handle(&ClientIdentity::keyed("a"), ChatInput::Message("hi".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Completion(_)));
        assert!(f.history.conversation("a").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_keep_each_exchange_together() {
        let f = fixture_with(
            Arc::new(KeywordEmbedder),
            100,
            RecordingProvider {
                echo: true,
                ..Default::default()
            },
        )
        .await;
        let client = ClientIdentity::keyed("same");

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let service = f.service.clone();
                let client = client.clone();
                tokio::spawn(async move {
                    service
                        .handle(&client, ChatInput::Message(format!("m{}", i)))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let turns = f.history.conversation("same").await.unwrap();
        assert_eq!(turns.len(), 64);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].text, format!("re: {}", pair[0].text));
        }
    }

    #[tokio::test]
    async fn anonymous_requests_are_stateless() {
        let f = fixture(Arc::new(KeywordEmbedder), 10, false).await;
        let first = ClientIdentity::anonymous("10.0.0.1");

        f.service
            .handle(&first, ChatInput::Message("my password is hunter2".into()))
            .await
            .unwrap();
        f.service
            .handle(&first, ChatInput::Message("what did I say?".into()))
            .await
            .unwrap();

        let seen = f.provider.seen.lock().unwrap();
        assert!(seen[1]
            .messages
            .iter()
            .all(|m| !m.content.contains("hunter2")));
        assert!(f.history.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_requests_still_count_against_the_limit() {
        let f = fixture(Arc::new(KeywordEmbedder), 1, false).await;
        let client = ClientIdentity::anonymous("10.0.0.1");

        f.service
            .handle(&client, ChatInput::Message("hi".into()))
            .await
            .unwrap();
        assert!(matches!(
            f.service.handle(&client, ChatInput::Message("hi".into())).await,
            Err(ChatError::RateLimited)
        ));
    }

    #[test]
    fn errors_map_to_http_statuses() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let status = |err: ChatError| ApiError::from(err).into_response().status();
        assert_eq!(status(ChatError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status(ChatError::Completion(CompletionError::Timeout { attempts: 3 })),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(ChatError::Completion(CompletionError::Upstream {
                attempts: 1,
                source: ProviderError::Transport("x".into()),
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(ChatError::InvalidRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
