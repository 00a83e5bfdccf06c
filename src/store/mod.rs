//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is everything the ingestion pipeline and the
//! retriever need from persistent storage: upsert chunks with their vectors,
//! nearest-neighbor query by vector, and full listing for statistics.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteIndex`] | The on-disk index used by every command |
//! | [`InMemoryIndex`] | Tests and embedding the library without a database |
//!
//! Both backends rank by cosine distance (`1 − cos`) ascending, ties broken
//! by chunk id, so results are identical for identical contents.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ChunkMetadata};

/// One chunk to be written, with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A stored chunk (text plus metadata) as returned by listing.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl IndexRecord {
    pub fn into_chunk(self) -> Chunk {
        self.metadata.into_chunk(self.text)
    }
}

/// A query match: the stored record and its cosine distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub record: IndexRecord,
    pub distance: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries by id.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// The `k` nearest entries to `embedding`, closest first.
    /// Returns fewer than `k` when the index holds fewer entries.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Every stored record, ordered by source url then chunk index.
    async fn get_all(&self) -> Result<Vec<IndexRecord>>;

    /// Content hash stored for a source, if any of its chunks are indexed.
    async fn source_hash(&self, url: &str) -> Result<Option<String>>;

    /// Remove every chunk belonging to `url`. Returns the number removed.
    async fn delete_source(&self, url: &str) -> Result<u64>;

    /// Atomically swap every chunk of `url` for `entries`. On error the
    /// previously stored chunks are left untouched.
    async fn replace_source(&self, url: &str, entries: &[IndexEntry]) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;
}

/// Sort hits by ascending distance, ties by id, and keep the first `k`.
pub(crate) fn rank_hits(mut hits: Vec<IndexHit>, k: usize) -> Vec<IndexHit> {
    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(k);
    hits
}

/// Cosine similarity in `[-1, 1]`. Empty, mismatched or zero-norm vectors
/// score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (f64::from(x), f64::from(y)))
        .fold((0.0, 0.0, 0.0), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// `1 − cosine_similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Order records by url, then chunk index.
pub(crate) fn sort_records(records: &mut [IndexRecord]) {
    records.sort_by(|a, b| {
        a.metadata
            .url
            .cmp(&b.metadata.url)
            .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_aligned_orthogonal_and_opposite() {
        assert!((cosine_distance(&[0.3, 0.4], &[0.6, 0.8])).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 2.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 1.0], &[-1.0, -1.0]) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
