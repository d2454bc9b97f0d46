#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::net::TcpListener;

use giacomino_backend::core::config::Settings;
use giacomino_backend::core::logging::LogStats;
use giacomino_backend::llm::{
    ChatRequest, CompletionProvider, EmbeddingProvider, ProviderError, Role,
};
use giacomino_backend::server::router::router;
use giacomino_backend::state::{AppState, Providers};

pub const CORPUS: &str = "Giacomo studies AI.\n---\nGiacomo plays guitar.\n---\nGiacomo lives in Rome.\n";
pub const HISTORY_SECRET: &str = "letmein";

/// Two-dimensional "embeddings": music talk points one way, everything
/// else the other.
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(inputs
            .iter()
            .map(|text| {
                if text.contains("guitar") || text.contains("music") {
                    vec![0.0, 1.0]
                } else if text.contains("Rome") {
                    vec![0.6, 0.4]
                } else {
                    vec![1.0, 0.0]
                }
            })
            .collect())
    }
}

/// Replies with the last user message and remembers each request.
#[derive(Default)]
pub struct EchoCompletion {
    pub requests: Mutex<Vec<ChatRequest>>,
}

#[async_trait]
impl CompletionProvider for EchoCompletion {
    fn name(&self) -> &str {
        "echo"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);
        Ok(format!("You said: {}", last))
    }
}

pub struct TestServer {
    pub base_url: String,
    pub completion: Arc<EchoCompletion>,
    pub client: reqwest::Client,
    _dir: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn spawn_server(extra_env: &[(&str, &str)]) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("documents.txt"), CORPUS).unwrap();
    std::fs::write(dir.path().join("system.txt"), "Today is {date}. Facts:\n{context}").unwrap();

    let mut env: Vec<(String, String)> = vec![
        ("TOGETHER_API_KEY".into(), "test-key".into()),
        ("DOCUMENTS_PATH".into(), path_in(&dir, "documents.txt")),
        ("SYSTEM_PROMPT_PATH".into(), path_in(&dir, "system.txt")),
        ("INDEX_CACHE_PATH".into(), path_in(&dir, "corpus_index.json")),
        ("HISTORY_FILE".into(), path_in(&dir, "saved_messages.jsonl")),
        ("RETRIEVE_TOP_K".into(), "2".into()),
    ];
    for (key, value) in extra_env {
        env.retain(|(k, _)| k != key);
        env.push((key.to_string(), value.to_string()));
    }
    let settings = Settings::from_lookup(move |key| {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
    .unwrap();

    let completion = Arc::new(EchoCompletion::default());
    let providers = Providers {
        completion: completion.clone(),
        embedding: Arc::new(KeywordEmbedder),
    };
    let state = AppState::initialize_with(settings, LogStats::new(), providers)
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        completion,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

fn path_in(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}
