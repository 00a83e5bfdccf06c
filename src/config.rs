//! TOML configuration.
//!
//! The whole file is parsed once in `main` into a [`Config`] and handed to
//! each command by reference. Only `[db]` is strictly required; every other
//! section has defaults, except `[llm]` which the `chat` command needs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::DocbotError;

/// Environment variable holding the chat API credential.
pub const CHAT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: Option<LlmSection>,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum words per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Word budget for sentences repeated at the start of the next chunk.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// How many chunks the chat path retrieves per question.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_chunks: default_max_chunks(),
            min_relevance: default_min_relevance(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_max_chunks() -> usize {
    5
}
fn default_min_relevance() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Prefix prepended to every text, for instruction-tuned models.
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            instruction: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// The `[llm]` table as written. Required keys stay optional here so
/// that commands other than `chat` load a half-finished section; see
/// [`Config::require_llm`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "max_tokens_per_request")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

/// A complete `[llm]` section.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_url: String,
    pub timeout_secs: u64,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone)]
pub struct PromptsConfig {
    pub system: String,
    /// Template with `{context}` and `{query}` placeholders.
    pub query: String,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_api_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Number of user/assistant exchanges kept in the session history.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_max_history() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapingConfig {
    #[serde(default = "default_urls_file")]
    pub urls_file: PathBuf,
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default)]
    pub default_delay_secs: f64,
    /// Per-domain delay in seconds, keyed by host (e.g. `"docs.rs"`).
    #[serde(default)]
    pub delays: HashMap<String, f64>,
    #[serde(default = "default_headers")]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_scrape_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            urls_file: default_urls_file(),
            raw_dir: default_raw_dir(),
            default_delay_secs: 0.0,
            delays: HashMap::new(),
            headers: default_headers(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_scrape_timeout_secs(),
        }
    }
}

fn default_urls_file() -> PathBuf {
    PathBuf::from("urls.txt")
}
fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_headers() -> HashMap<String, String> {
    HashMap::from([(
        "User-Agent".to_string(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
    )])
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_scrape_timeout_secs() -> u64 {
    30
}

impl Config {
    /// The complete `[llm]` section, or a [`DocbotError::Config`] naming
    /// what is missing and how to fix it.
    pub fn require_llm(&self) -> Result<LlmConfig, DocbotError> {
        let llm = self.llm.as_ref().ok_or_else(|| {
            DocbotError::config(
                "[llm] section (model, max_tokens, prompts) is missing",
                "add an [llm] section to your config",
            )
        })?;

        let mut missing = Vec::new();
        if llm.model.is_none() {
            missing.push("llm.model");
        }
        if llm.max_tokens.is_none() {
            missing.push("llm.max_tokens");
        }
        if llm.prompts.system.is_none() {
            missing.push("llm.prompts.system");
        }
        if llm.prompts.query.is_none() {
            missing.push("llm.prompts.query");
        }

        match (&llm.model, llm.max_tokens, &llm.prompts.system, &llm.prompts.query) {
            (Some(model), Some(max_tokens), Some(system), Some(query)) => Ok(LlmConfig {
                model: model.clone(),
                max_tokens,
                temperature: llm.temperature,
                api_url: llm.api_url.clone(),
                timeout_secs: llm.timeout_secs,
                prompts: PromptsConfig {
                    system: system.clone(),
                    query: query.clone(),
                },
            }),
            _ => Err(DocbotError::config(
                format!("[llm] is incomplete, missing {}", missing.join(", ")),
                "fill in the [llm] section of your config",
            )),
        }
    }
}

/// Read the chat API credential from the environment.
pub fn chat_api_key() -> Result<String, DocbotError> {
    match std::env::var(CHAT_API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(DocbotError::config(
            format!("{} not found in environment", CHAT_API_KEY_ENV),
            "set your API credential",
        )),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.max_chunks == 0 {
        anyhow::bail!("chunking.max_chunks must be >= 1");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        tracing::warn!(
            chunk_size = config.chunking.chunk_size,
            chunk_overlap = config.chunking.chunk_overlap,
            "chunk_overlap >= chunk_size; overlap will be trimmed to fit each chunk"
        );
    }

    // Validate chat
    if config.chat.max_history == 0 {
        anyhow::bail!("chat.max_history must be >= 1");
    }

    // Validate llm
    if let Some(llm) = &config.llm {
        if llm.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            anyhow::bail!("llm.model must not be empty");
        }
        if llm.max_tokens == Some(0) {
            anyhow::bail!("llm.max_tokens must be > 0");
        }
        if !(0.0..=1.0).contains(&llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 1.0]");
        }
        if let Some(query) = &llm.prompts.query {
            for placeholder in ["{context}", "{query}"] {
                if !query.contains(placeholder) {
                    anyhow::bail!("llm.prompts.query must contain {}", placeholder);
                }
            }
        }
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        // The local provider infers dims from the model name
        let missing_dims = config.embedding.dims.is_none() || config.embedding.dims == Some(0);
        if missing_dims && config.embedding.provider != "local" {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() && config.embedding.provider != "local" {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(config)
}
