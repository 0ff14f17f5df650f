// coordinator-agent: Configuration support

use crate::error::{CoordinatorError, CoordinatorResult};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Collection holding the service catalog in the vector store
pub const SERVICE_COLLECTION: &str = "services";

const DEFAULT_CHROMA_URL: &str = "http://chroma-services:8000";
const DEFAULT_EMBED_PATH: &str = "/v1/embeddings";
const DEFAULT_CHAT_PATH: &str = "/v1/chat/completions";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-all-minilm-l12-v2";
const DEFAULT_CHAT_MODEL: &str = "swe-dev-32b-i1";
const DEFAULT_TRACE_LOG_PATH: &str = "/shared/logs/trace.log";

/// Prompt templates for the service selection (rerank) step.
///
/// Templates use `{query}` and `{candidates}` placeholders. The embedded
/// defaults keep the binary runnable without a prompts volume mounted.
#[derive(Debug, Clone)]
pub struct SelectionPrompts {
    pub system: String,
    pub user: String,
}

impl Default for SelectionPrompts {
    fn default() -> Self {
        Self {
            system: include_str!("../prompts/service_selection_system.txt").to_string(),
            user: include_str!("../prompts/service_selection_user.txt").to_string(),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Base URL of the vector store holding the service catalog
    pub chroma_url: String,

    /// Base URL of the OpenAI-compatible LLM backend
    pub lmstudio_url: String,

    /// Embedding endpoint path
    pub embed_path: String,

    /// Chat completion endpoint path
    pub chat_path: String,

    /// Embedding model name
    pub embed_model: String,

    /// Chat model name
    pub chat_model: String,

    /// Trace log file, one JSON audit event per line
    pub trace_log_path: PathBuf,

    /// Connect timeout for every outbound HTTP call
    pub connect_timeout: Duration,

    /// Total request timeout for every outbound HTTP call
    pub request_timeout: Duration,

    /// Service selection prompt templates
    pub selection_prompts: SelectionPrompts,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            chroma_url: DEFAULT_CHROMA_URL.to_string(),
            lmstudio_url: String::new(),
            embed_path: DEFAULT_EMBED_PATH.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            trace_log_path: PathBuf::from(DEFAULT_TRACE_LOG_PATH),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(45),
            selection_prompts: SelectionPrompts::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    ///
    /// `LMSTUDIO_URL` is mandatory; everything else falls back to the
    /// deployment defaults.
    pub fn from_env() -> CoordinatorResult<Self> {
        let lmstudio_url = env::var("LMSTUDIO_URL")
            .map_err(|_| CoordinatorError::Config("missing LMSTUDIO_URL env var".to_string()))?;

        let mut prompts = SelectionPrompts::default();
        if let Ok(path) = env::var("SERVICE_SELECTION_SYSTEM_PROMPT") {
            prompts.system = load_prompt(&path)?;
        }
        if let Ok(path) = env::var("SERVICE_SELECTION_USER_PROMPT") {
            prompts.user = load_prompt(&path)?;
        }

        Ok(Self {
            chroma_url: env::var("CHROMA_AGENTS_URL")
                .unwrap_or_else(|_| DEFAULT_CHROMA_URL.to_string()),
            lmstudio_url,
            embed_path: env::var("LMSTUDIO_EMBED_PATH")
                .unwrap_or_else(|_| DEFAULT_EMBED_PATH.to_string()),
            chat_path: env::var("LMSTUDIO_CHAT_PATH")
                .unwrap_or_else(|_| DEFAULT_CHAT_PATH.to_string()),
            embed_model: env::var("EMBED_MODEL").unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string()),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string()),
            trace_log_path: PathBuf::from(DEFAULT_TRACE_LOG_PATH),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(45),
            selection_prompts: prompts,
        })
    }

    /// URL of the chat completion endpoint
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.lmstudio_url.trim_end_matches('/'), self.chat_path)
    }

    /// URL of the embedding endpoint
    pub fn embed_url(&self) -> String {
        format!("{}{}", self.lmstudio_url.trim_end_matches('/'), self.embed_path)
    }
}

fn load_prompt(path: &str) -> CoordinatorResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CoordinatorError::Config(format!("failed to load prompt from {}: {}", path, e))
    })
}
