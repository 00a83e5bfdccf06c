//! Error taxonomy for the query and ingestion paths.
//!
//! Command plumbing uses `anyhow`; these typed errors exist where callers
//! need to decide what to do with a failure (degrade, skip, surface).

use thiserror::Error;

/// Result alias for operations that return [`DocbotError`].
pub type Result<T> = std::result::Result<T, DocbotError>;

#[derive(Debug, Error)]
pub enum DocbotError {
    /// A required configuration value is missing or malformed.
    #[error("configuration error: {message} ({hint})")]
    Config { message: String, hint: String },

    /// Embedding or vector search failed. Recovered by the chat path.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The chat API failed and the retry budget is spent (or the failure
    /// was not retryable).
    #[error("upstream chat API error: {0}")]
    Upstream(String),

    /// A single document could not be processed, chunked, or embedded.
    #[error("failed to ingest {url}: {message}")]
    Ingestion { url: String, message: String },
}

impl DocbotError {
    pub fn config(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn retrieval(err: impl std::fmt::Display) -> Self {
        Self::Retrieval(err.to_string())
    }

    pub fn ingestion(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Ingestion {
            url: url.into(),
            message: err.to_string(),
        }
    }
}

/// Failure from a single chat API call, classified for the retry policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Rate limiting, overload, server errors, dropped connections.
    #[error("transient: {0}")]
    Transient(String),
    /// Malformed requests, bad credentials, unparseable responses.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }
}

impl From<ChatError> for DocbotError {
    fn from(err: ChatError) -> Self {
        DocbotError::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_hint() {
        let err = DocbotError::config("llm section missing", "set your API credential");
        let msg = err.to_string();
        assert!(msg.contains("llm section missing"));
        assert!(msg.contains("set your API credential"));
    }

    #[test]
    fn chat_error_classification() {
        assert!(ChatError::Transient("429".into()).is_transient());
        assert!(!ChatError::Fatal("400".into()).is_transient());
    }

    #[test]
    fn chat_error_becomes_upstream() {
        let err: DocbotError = ChatError::Fatal("bad request".into()).into();
        assert!(matches!(err, DocbotError::Upstream(ref m) if m.contains("bad request")));
    }
}
