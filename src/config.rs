//! Configuration types.
//!
//! Everything is read from environment variables; see `AppConfig::from_env`.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::email::PromptConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::rag::RagConfig;

pub const DEFAULT_CATEGORIZATION_PROMPT: &str = "Categorize this email into exactly one of: \
     Important, Newsletter, Spam, To-Do. To-Do emails ask the user to do something. \
     Respond with the category name only.";

pub const DEFAULT_ACTION_ITEM_PROMPT: &str = "task, deadline";

pub const DEFAULT_AUTO_REPLY_PROMPT: &str = "Write a short, polite reply. If the email is a meeting \
     request, ask for an agenda. Keep a professional tone and sign off as the recipient.";

/// Prompts used to seed an empty prompt store.
pub fn default_prompts() -> PromptConfig {
    PromptConfig {
        categorization: DEFAULT_CATEGORIZATION_PROMPT.to_string(),
        action_item: DEFAULT_ACTION_ITEM_PROMPT.to_string(),
        auto_reply: DEFAULT_AUTO_REPLY_PROMPT.to_string(),
    }
}

/// Model-call pacing for re-processing passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub max_calls: u32,
    pub interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        // One categorize + one extract per two seconds.
        Self {
            max_calls: 2,
            interval: Duration::from_millis(2000),
        }
    }
}

/// Embedding service endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub db_path: PathBuf,
    pub port: u16,
    pub pacing: PacingConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    /// Directory for daily-rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend: LlmBackend = match get("LLM_BACKEND") {
            Some(raw) => raw.parse()?,
            None => LlmBackend::Anthropic,
        };
        let api_key = get("LLM_API_KEY")
            .or_else(|| get(backend.key_env_var()))
            .ok_or_else(|| ConfigError::MissingEnvVar(format!(
                "LLM_API_KEY (or {})",
                backend.key_env_var()
            )))?;
        let model = get("LLM_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let defaults = RagConfig::default();
        let pacing_defaults = PacingConfig::default();

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            db_path: get("INBOX_AGENT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/inbox-agent.db")),
            port: parse_or(&get, "INBOX_AGENT_PORT", 8000)?,
            pacing: PacingConfig {
                max_calls: parse_or(&get, "INBOX_AGENT_PACING_CALLS", pacing_defaults.max_calls)?,
                interval: Duration::from_millis(parse_or(
                    &get,
                    "INBOX_AGENT_PACING_INTERVAL_MS",
                    pacing_defaults.interval.as_millis() as u64,
                )?),
            },
            embedding: EmbeddingConfig {
                url: get("EMBEDDING_API_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:7860/embed".to_string()),
                timeout: Duration::from_secs(parse_or(&get, "EMBEDDING_TIMEOUT_SECS", 30)?),
            },
            rag: RagConfig {
                top_k: parse_or(&get, "RAG_TOP_K", defaults.top_k)?,
                chunk_size: parse_or(&get, "RAG_CHUNK_SIZE", defaults.chunk_size)?,
                chunk_overlap: parse_or(&get, "RAG_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            },
            log_dir: get("INBOX_AGENT_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
