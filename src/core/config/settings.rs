use std::env;
use std::time::Duration;

use super::paths::AppPaths;
use super::validation::{
    comma_list, optional_string, require_string, string_or, u64_in_range, ConfigError,
};

pub const DEFAULT_TEXT_MODEL: &str = "meta-llama/Llama-3.2-3B-Instruct-Turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-large-en-v1.5";
pub const DEFAULT_TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployEnv {
    Production,
    Development,
}

impl DeployEnv {
    fn parse(raw: Option<String>) -> Result<Self, ConfigError> {
        match optional_string(raw).as_deref() {
            None | Some("production") => Ok(DeployEnv::Production),
            Some("development") => Ok(DeployEnv::Development),
            Some(other) => Err(ConfigError::Invalid {
                key: "FLASK_ENV",
                expected: "'production' or 'development'",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, DeployEnv::Development)
    }
}

/// Immutable process configuration, built once at startup and shared
/// through `AppState`.
#[derive(Clone)]
pub struct Settings {
    pub together_api_key: String,
    pub together_base_url: String,
    pub deploy_env: DeployEnv,
    pub host: String,
    pub port: u16,
    pub retrieve_top_k: usize,
    pub max_chars: usize,
    pub history_key: Option<String>,
    pub text_model: String,
    pub embedding_model: String,
    pub chat_requests_per_hour: u64,
    pub request_timeout: Duration,
    pub completion_max_retries: u32,
    pub embed_batch_size: usize,
    pub cors_allowed_origins: Vec<String>,
    pub paths: AppPaths,
}

// Secrets stay out of Debug output so the struct can be logged at startup.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("together_api_key", &"****")
            .field("together_base_url", &self.together_base_url)
            .field("deploy_env", &self.deploy_env)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("retrieve_top_k", &self.retrieve_top_k)
            .field("max_chars", &self.max_chars)
            .field(
                "history_key",
                &self.history_key.as_ref().map(|_| "****"),
            )
            .field("text_model", &self.text_model)
            .field("embedding_model", &self.embedding_model)
            .field("chat_requests_per_hour", &self.chat_requests_per_hour)
            .field("request_timeout", &self.request_timeout)
            .field("completion_max_retries", &self.completion_max_retries)
            .field("embed_batch_size", &self.embed_batch_size)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("paths", &self.paths)
            .finish()
    }
}

impl Settings {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => tracing::warn!("Failed to read .env: {}", err),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let together_api_key = require_string("TOGETHER_API_KEY", lookup("TOGETHER_API_KEY"))?;
        let together_base_url = string_or(lookup("TOGETHER_BASE_URL"), DEFAULT_TOGETHER_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let deploy_env = DeployEnv::parse(lookup("FLASK_ENV"))?;
        let host = string_or(lookup("HOST"), "0.0.0.0");
        let port = u64_in_range("PORT", lookup("PORT"), 5001, 1, 65_535)? as u16;
        let retrieve_top_k =
            u64_in_range("RETRIEVE_TOP_K", lookup("RETRIEVE_TOP_K"), 10, 1, 10_000)? as usize;
        let max_chars =
            u64_in_range("MAX_CHARS", lookup("MAX_CHARS"), 8_000, 1, 10_000_000)? as usize;
        let history_key = optional_string(lookup("HISTORY_KEY"));
        let text_model = string_or(lookup("TEXT_MODEL_PATH"), DEFAULT_TEXT_MODEL);
        let embedding_model = string_or(lookup("EMB_MODEL_PATH"), DEFAULT_EMBEDDING_MODEL);
        let chat_requests_per_hour = u64_in_range(
            "CHAT_REQUESTS_PER_HOUR_LIMIT",
            lookup("CHAT_REQUESTS_PER_HOUR_LIMIT"),
            60,
            0,
            u32::MAX as u64,
        )?;
        let request_timeout = Duration::from_secs(u64_in_range(
            "REQUEST_TIMEOUT_SECS",
            lookup("REQUEST_TIMEOUT_SECS"),
            30,
            1,
            3_600,
        )?);
        let completion_max_retries = u64_in_range(
            "COMPLETION_MAX_RETRIES",
            lookup("COMPLETION_MAX_RETRIES"),
            2,
            0,
            5,
        )? as u32;
        let embed_batch_size =
            u64_in_range("EMBED_BATCH_SIZE", lookup("EMBED_BATCH_SIZE"), 32, 1, 1_024)? as usize;
        let cors_allowed_origins = comma_list(lookup("CORS_ALLOWED_ORIGINS"));
        let paths = AppPaths::from_lookup(&lookup);

        Ok(Self {
            together_api_key,
            together_base_url,
            deploy_env,
            host,
            port,
            retrieve_top_k,
            max_chars,
            history_key,
            text_model,
            embedding_model,
            chat_requests_per_hour,
            request_timeout,
            completion_max_retries,
            embed_batch_size,
            cors_allowed_origins,
            paths,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
