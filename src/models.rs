//! Core data types that flow through ingestion and the chat path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of source document, decided from content-type and URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Html,
    Text,
    Markdown,
    Pdf,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Html => "html",
            DocType::Text => "text",
            DocType::Markdown => "markdown",
            DocType::Pdf => "pdf",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cleaned document text produced by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub url: String,
    pub doc_type: DocType,
    pub content: String,
}

/// A chunk of a document, as stored in and returned from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// 0-based position within the parent document.
    pub index: usize,
    pub total_chunks: usize,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Identifier inside the vector index: unique per `(source_url, index)`.
    pub fn id(&self) -> String {
        chunk_id(&self.source_url, self.index)
    }
}

pub fn chunk_id(source_url: &str, index: usize) -> String {
    format!("{}_{}", source_url, index)
}

/// Per-chunk metadata persisted next to the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub url: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub processed_at: DateTime<Utc>,
    /// SHA-256 of the parent document's cleaned content.
    pub content_hash: String,
}

impl ChunkMetadata {
    pub fn into_chunk(self, text: String) -> Chunk {
        Chunk {
            text,
            index: self.chunk_index,
            total_chunks: self.total_chunks,
            source_url: self.url,
            created_at: self.processed_at,
        }
    }
}

/// A chunk ranked against a query.
///
/// `relevance` is `1 - distance` and is not clamped: very dissimilar
/// vectors can produce slightly negative values.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub relevance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Sidecar metadata written by the scraper next to each raw download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPageMeta {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_url_and_index() {
        assert_eq!(chunk_id("https://a.dev/x", 3), "https://a.dev/x_3");
    }

    #[test]
    fn metadata_serializes_type_key() {
        let meta = ChunkMetadata {
            url: "u".into(),
            doc_type: DocType::Markdown,
            chunk_index: 0,
            total_chunks: 1,
            processed_at: Utc::now(),
            content_hash: "h".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "markdown");
        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn turn_serializes_as_message() {
        let json = serde_json::to_value(ConversationTurn::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }
}
