//! Query-time retrieval: embed the query, ask the index for the nearest
//! chunks, and turn distances into relevance scores.
//!
//! No threshold is applied here; callers filter with
//! [`crate::context::filter_by_relevance`].

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{DocbotError, Result};
use crate::models::SearchResult;
use crate::store::VectorIndex;

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Up to `k` results, sorted by descending relevance. An empty index
    /// yields an empty list.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| DocbotError::retrieval(format!("{:#}", e)))?;
        let hits = self
            .index
            .query(&embedding, k)
            .await
            .map_err(|e| DocbotError::retrieval(format!("{:#}", e)))?;

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .take(k)
            .map(|hit| SearchResult {
                relevance: 1.0 - hit.distance,
                chunk: hit.record.into_chunk(),
            })
            .collect();
        results.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

        Ok(results)
    }
}
