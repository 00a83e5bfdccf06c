//! Embedding providers: turn chunk text and chat questions into vectors.
//!
//! | `embedding.provider` | Implementation |
//! |----------------------|----------------|
//! | `disabled` | [`DisabledProvider`], fails on any non-empty input |
//! | `openai` | [`HttpProvider`] against `https://api.openai.com/v1/embeddings` |
//! | `ollama` | [`HttpProvider`] against `{url}/api/embed` |
//! | `local` | `LocalProvider`, fastembed in-process (`local-embeddings` feature) |
//!
//! Documents and queries must go through the same provider and model, or
//! distances in the index mean nothing. When `embedding.instruction` is set
//! every text is sent as `"{instruction} {text}"`.
//!
//! HTTP calls are retried through [`RetryPolicy`]: 429, 5xx and connection
//! errors back off 1s, 2s, 4s ... up to 32s, for `max_retries` retries.
//! Any other 4xx fails at once.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::retry::RetryPolicy;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for identical input and model
/// configuration, and must return an empty vector for empty input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a chat question or search query.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => bail!("{} returned no vector for the query", self.model_name()),
        }
    }
}

fn with_instruction(instruction: Option<&str>, texts: &[String]) -> Vec<String> {
    match instruction.map(str::trim) {
        Some(prefix) if !prefix.is_empty() => {
            texts.iter().map(|t| format!("{} {}", prefix, t)).collect()
        }
        _ => texts.to_vec(),
    }
}

/// Stands in when `embedding.provider = "disabled"`: ingestion and chat
/// retrieval fail per call instead of at startup.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        bail!("embeddings are disabled; set [embedding] provider in the config")
    }
}

/// Which HTTP embeddings API a [`HttpProvider`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpApi {
    OpenAi,
    Ollama,
}

impl HttpApi {
    fn label(&self) -> &'static str {
        match self {
            HttpApi::OpenAi => "OpenAI",
            HttpApi::Ollama => "Ollama",
        }
    }
}

/// A failed HTTP attempt, classified for the retry policy.
#[derive(Debug)]
struct HttpFailure {
    transient: bool,
    message: String,
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Embedding provider backed by the OpenAI or Ollama HTTP API.
pub struct HttpProvider {
    api: HttpApi,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    instruction: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl HttpProvider {
    /// # Errors
    ///
    /// `model` or `dims` missing from `[embedding]`, or, for OpenAI,
    /// `OPENAI_API_KEY` not set.
    pub fn new(api: HttpApi, config: &EmbeddingConfig) -> Result<Self> {
        let label = api.label();
        let model = config
            .model
            .clone()
            .with_context(|| format!("embedding.model is required for the {} provider", label))?;
        let dims = config
            .dims
            .with_context(|| format!("embedding.dims is required for the {} provider", label))?;

        let (endpoint, api_key) = match api {
            HttpApi::OpenAi => {
                let key = std::env::var("OPENAI_API_KEY")
                    .context("OPENAI_API_KEY must be set for the openai embedding provider")?;
                (OPENAI_EMBEDDINGS_URL.to_string(), Some(key))
            }
            HttpApi::Ollama => {
                let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
                (format!("{}/api/embed", base.trim_end_matches('/')), None)
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api,
            endpoint,
            api_key,
            model,
            dims,
            instruction: config.instruction.clone(),
            retry: RetryPolicy {
                max_attempts: config.max_retries + 1,
                multiplier: 1.0,
                min_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(32),
            },
            client,
        })
    }

    /// One POST, with the response body on success.
    async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value, HttpFailure> {
        let label = self.api.label();
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| HttpFailure {
            transient: true,
            message: format!("{} connection error: {}", label, e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpFailure {
                transient: status.as_u16() == 429 || status.is_server_error(),
                message: format!("{} embeddings API returned {}: {}", label, status, text),
            });
        }

        response.json().await.map_err(|e| HttpFailure {
            transient: false,
            message: format!("{} embeddings API sent invalid JSON: {}", label, e),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": with_instruction(self.instruction.as_deref(), texts),
        });

        let json = self
            .retry
            .run(|| self.post(&body), |e: &HttpFailure| e.transient)
            .await
            .map_err(|e| anyhow::anyhow!(e.message))?;

        let vectors = match self.api {
            HttpApi::OpenAi => openai_vectors(&json)?,
            HttpApi::Ollama => ollama_vectors(&json)?,
        };
        if vectors.len() != texts.len() {
            bail!(
                "{} returned {} vectors for {} texts",
                self.api.label(),
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

fn as_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

/// `data[].embedding`, reordered by each item's `index`.
fn openai_vectors(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json["data"]
        .as_array()
        .context("OpenAI response has no `data` array")?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let vector = as_vector(&item["embedding"])
                .context("OpenAI response item has no numeric `embedding`")?;
            let index = item["index"].as_u64().map_or(pos, |i| i as usize);
            Ok((index, vector))
        })
        .collect::<Result<Vec<_>>>()?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn ollama_vectors(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json["embeddings"]
        .as_array()
        .context("Ollama response has no `embeddings` array")?
        .iter()
        .map(|e| as_vector(e).context("Ollama embedding is not a numeric array"))
        .collect()
}

/// Runs an ONNX embedding model in-process. The model is downloaded from
/// Hugging Face on first use and cached; later runs are fully offline.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    instruction: Option<String>,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        use fastembed::EmbeddingModel;

        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-small-en-v1.5".to_string());
        let (which, native_dims) = match model_name.as_str() {
            "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
            "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
            other => bail!(
                "unsupported local embedding model '{}' (try bge-small-en-v1.5, \
                 bge-base-en-v1.5, bge-large-en-v1.5, all-minilm-l6-v2 or nomic-embed-text-v1.5)",
                other
            ),
        };

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(which).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("could not load local model {}: {}", model_name, e))?;

        Ok(Self {
            dims: config.dims.unwrap_or(native_dims),
            model_name,
            instruction: config.instruction.clone(),
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts = with_instruction(self.instruction.as_deref(), texts);
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;

        // ONNX inference is CPU-bound.
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("local embedding failed: {}", e))
        })
        .await?
    }
}

/// Build the provider named by `embedding.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "disabled" => Arc::new(DisabledProvider),
        "openai" => Arc::new(HttpProvider::new(HttpApi::OpenAi, config)?),
        "ollama" => Arc::new(HttpProvider::new(HttpApi::Ollama, config)?),
        #[cfg(feature = "local-embeddings")]
        "local" => Arc::new(LocalProvider::new(config)?),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("the local embedding provider needs `--features local-embeddings`"),
        other => bail!("unknown embedding provider: {}", other),
    };
    tracing::debug!(
        provider = %config.provider,
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding provider ready"
    );
    Ok(provider)
}
