//! In-memory [`VectorIndex`] for tests and library embedding.
//!
//! Entries live in a `HashMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every stored vector.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{
    cosine_distance, rank_hits, sort_records, IndexEntry, IndexHit, IndexRecord, VectorIndex,
};

#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

fn to_record(entry: &IndexEntry) -> IndexRecord {
    IndexRecord {
        id: entry.id.clone(),
        text: entry.text.clone(),
        metadata: entry.metadata.clone(),
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut stored = self.entries.write().map_err(poisoned)?;
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let stored = self.entries.read().map_err(poisoned)?;
        let hits = stored
            .values()
            .map(|entry| IndexHit {
                record: to_record(entry),
                distance: cosine_distance(embedding, &entry.embedding),
            })
            .collect();
        Ok(rank_hits(hits, k))
    }

    async fn get_all(&self) -> Result<Vec<IndexRecord>> {
        let stored = self.entries.read().map_err(poisoned)?;
        let mut records: Vec<IndexRecord> = stored.values().map(to_record).collect();
        sort_records(&mut records);
        Ok(records)
    }

    async fn source_hash(&self, url: &str) -> Result<Option<String>> {
        let stored = self.entries.read().map_err(poisoned)?;
        Ok(stored
            .values()
            .find(|e| e.metadata.url == url)
            .map(|e| e.metadata.content_hash.clone()))
    }

    async fn delete_source(&self, url: &str) -> Result<u64> {
        let mut stored = self.entries.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|_, e| e.metadata.url != url);
        Ok((before - stored.len()) as u64)
    }

    async fn replace_source(&self, url: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut stored = self.entries.write().map_err(poisoned)?;
        stored.retain(|_, e| e.metadata.url != url);
        stored.extend(entries.iter().map(|e| (e.id.clone(), e.clone())));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::entry;

    #[tokio::test]
    async fn query_orders_by_distance() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[
                entry("https://a.dev", 0, 2, vec![0.0, 1.0]),
                entry("https://a.dev", 1, 2, vec![1.0, 0.0]),
                entry("https://b.dev", 0, 1, vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "https://a.dev_1");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].record.id, "https://b.dev_0");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn query_on_empty_index_is_empty() {
        let index = InMemoryIndex::new();
        assert!(index.query(&[1.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[entry("https://a.dev", 0, 1, vec![1.0])])
            .await
            .unwrap();
        let mut replacement = entry("https://a.dev", 0, 1, vec![1.0]);
        replacement.text = "new text".into();
        index.upsert(&[replacement]).await.unwrap();

        let all = index.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "new text");
    }

    #[tokio::test]
    async fn delete_source_removes_only_that_url() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[
                entry("https://a.dev", 0, 2, vec![1.0]),
                entry("https://a.dev", 1, 2, vec![1.0]),
                entry("https://b.dev", 0, 1, vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.delete_source("https://a.dev").await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.source_hash("https://a.dev").await.unwrap(), None);
        assert_eq!(
            index.source_hash("https://b.dev").await.unwrap().as_deref(),
            Some("hash-https://b.dev")
        );
    }

    #[tokio::test]
    async fn get_all_sorted_by_url_then_index() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[
                entry("https://b.dev", 0, 1, vec![1.0]),
                entry("https://a.dev", 1, 2, vec![1.0]),
                entry("https://a.dev", 0, 2, vec![1.0]),
            ])
            .await
            .unwrap();
        let ids: Vec<String> = index
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["https://a.dev_0", "https://a.dev_1", "https://b.dev_0"]);
    }
}
