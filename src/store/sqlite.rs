//! SQLite-backed [`VectorIndex`].
//!
//! One `chunks` table holds text, JSON metadata, and the embedding as a
//! little-endian f32 BLOB. Queries load every vector and rank by cosine
//! distance in Rust; documentation corpora are small enough for this.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::{cosine_distance, rank_hits, IndexEntry, IndexHit, IndexRecord, VectorIndex};
use crate::config::Config;
use crate::models::ChunkMetadata;
use crate::{db, migrate};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Trailing bytes that do not fill an f32 are ignored.
fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn parse_metadata(id: &str, json: &str) -> Result<ChunkMetadata> {
    serde_json::from_str(json).with_context(|| format!("corrupt metadata for chunk {}", id))
}

/// Insert or overwrite `entries` inside the caller's transaction.
async fn write_entries(conn: &mut SqliteConnection, entries: &[IndexEntry]) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    for entry in entries {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_url, chunk_index, content_hash, text,
                                metadata_json, embedding, dims, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_url = excluded.source_url,
                chunk_index = excluded.chunk_index,
                content_hash = excluded.content_hash,
                text = excluded.text,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding,
                dims = excluded.dims,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.metadata.url)
        .bind(entry.metadata.chunk_index as i64)
        .bind(&entry.metadata.content_hash)
        .bind(&entry.text)
        .bind(&metadata_json)
        .bind(encode_embedding(&entry.embedding))
        .bind(entry.embedding.len() as i64)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_entries(&mut tx, entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_source(&self, url: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE source_url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?;
        write_entries(&mut tx, entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let rows = sqlx::query("SELECT id, text, metadata_json, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            hits.push(IndexHit {
                distance: cosine_distance(embedding, &decode_embedding(&blob)),
                record: IndexRecord {
                    metadata: parse_metadata(&id, &metadata_json)?,
                    text: row.get("text"),
                    id,
                },
            });
        }

        Ok(rank_hits(hits, k))
    }

    async fn get_all(&self) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(
            "SELECT id, text, metadata_json FROM chunks ORDER BY source_url, chunk_index",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let metadata_json: String = row.get("metadata_json");
                Ok(IndexRecord {
                    metadata: parse_metadata(&id, &metadata_json)?,
                    text: row.get("text"),
                    id,
                })
            })
            .collect()
    }

    async fn source_hash(&self, url: &str) -> Result<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM chunks WHERE source_url = ? LIMIT 1")
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    async fn delete_source(&self, url: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::entry;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, SqliteIndex::new(pool))
    }

    #[test]
    fn embedding_blob_is_little_endian_f32() {
        let v = vec![1.5f32, -0.25, 0.0];
        let blob = encode_embedding(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[..4], &1.5f32.to_le_bytes());
        assert_eq!(decode_embedding(&blob), v);
        assert_eq!(decode_embedding(&blob[..6]), vec![1.5]);
    }

    #[tokio::test]
    async fn roundtrip_and_query() {
        let (_tmp, index) = open_temp().await;
        index
            .upsert(&[
                entry("https://a.dev", 0, 2, vec![0.0, 1.0]),
                entry("https://a.dev", 1, 2, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "https://a.dev_1");
        assert_eq!(hits[0].record.metadata.chunk_index, 1);
        assert_eq!(hits[0].record.metadata.total_chunks, 2);
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let (_tmp, index) = open_temp().await;
        let e = entry("https://a.dev", 0, 1, vec![1.0]);
        index.upsert(&[e.clone()]).await.unwrap();
        index.upsert(&[e]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn source_hash_and_delete() {
        let (_tmp, index) = open_temp().await;
        index
            .upsert(&[
                entry("https://a.dev", 0, 1, vec![1.0]),
                entry("https://b.dev", 0, 1, vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(
            index.source_hash("https://a.dev").await.unwrap().as_deref(),
            Some("hash-https://a.dev")
        );
        assert_eq!(index.delete_source("https://a.dev").await.unwrap(), 1);
        assert_eq!(index.source_hash("https://a.dev").await.unwrap(), None);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_source_swaps_only_that_source() {
        let (_tmp, index) = open_temp().await;
        index
            .upsert(&[
                entry("https://a.dev", 0, 2, vec![1.0]),
                entry("https://a.dev", 1, 2, vec![1.0]),
                entry("https://b.dev", 0, 1, vec![1.0]),
            ])
            .await
            .unwrap();

        let mut fresh = entry("https://a.dev", 0, 1, vec![0.5]);
        fresh.metadata.content_hash = "new".into();
        index.replace_source("https://a.dev", &[fresh]).await.unwrap();

        let records = index.get_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata.content_hash, "new");
        assert_eq!(records[1].metadata.url, "https://b.dev");
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_chunks() {
        let (_tmp, index) = open_temp().await;
        index
            .upsert(&[entry("https://a.dev", 0, 1, vec![1.0])])
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_text BEFORE INSERT ON chunks WHEN NEW.text = 'rejected' \
             BEGIN SELECT RAISE(ABORT, 'insert rejected'); END",
        )
        .execute(&index.pool)
        .await
        .unwrap();

        let mut bad = entry("https://a.dev", 0, 1, vec![0.5]);
        bad.text = "rejected".into();
        assert!(index.replace_source("https://a.dev", &[bad]).await.is_err());

        let records = index.get_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "https://a.dev chunk 0");
    }

    #[tokio::test]
    async fn migrations_rerun_safely() {
        let (_tmp, index) = open_temp().await;
        migrate::apply(&index.pool).await.unwrap();
        assert!(index.get_all().await.unwrap().is_empty());
    }
}
