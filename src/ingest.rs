//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow from raw cache to vector index:
//! raw file + sidecar → document processor → chunker → embedding → index.
//!
//! Failures are per document: a file that cannot be read, processed,
//! chunked, or embedded is reported as an [`DocbotError::Ingestion`] and
//! the batch moves on. The stored hash covers the document text together
//! with the embedding model, dimensions, instruction, chunk size and
//! overlap; a document is only left alone when all of them match what the
//! index already holds. Re-indexing a document swaps its chunks in one
//! index transaction, so a failed write keeps the previous version.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::DocbotError;
use crate::models::{chunk_id, ChunkMetadata, Document};
use crate::processor;
use crate::progress::{DocOutcome, IngestProgressEvent, IngestProgressReporter, ProgressMode};
use crate::scrape::read_meta;
use crate::store::{IndexEntry, SqliteIndex, VectorIndex};

/// Result of ingesting one document that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocIngest {
    /// Chunks were (re)written.
    Indexed { chunks: usize },
    /// The index already holds this exact content.
    Unchanged,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub found: u64,
    pub indexed: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub chunks_written: u64,
}

/// SHA-256 of the index settings and the cleaned document text, hex
/// encoded.
pub fn content_hash(settings: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(settings.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `*.raw` files directly inside `raw_dir`, sorted by file name.
pub fn list_raw_files(raw_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(raw_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("raw"))
        .collect();
    files.sort();
    files
}

pub struct Ingester<'a> {
    config: &'a Config,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl<'a> Ingester<'a> {
    pub fn new(
        config: &'a Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
        }
    }

    /// Everything besides the text that shapes the stored chunks and
    /// vectors.
    fn index_settings(&self) -> String {
        format!(
            "model={};dims={};instruction={};chunk_size={};chunk_overlap={}",
            self.embedder.model_name(),
            self.embedder.dims(),
            self.config.embedding.instruction.as_deref().unwrap_or(""),
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )
    }

    /// Chunk, embed, and store one document, replacing any chunks the
    /// index already holds for its URL.
    pub async fn ingest_document(&self, doc: &Document) -> Result<DocIngest, DocbotError> {
        let fail = |e: anyhow::Error| DocbotError::ingestion(&doc.url, format!("{:#}", e));
        let hash = content_hash(&self.index_settings(), &doc.content);

        if self.index.source_hash(&doc.url).await.map_err(fail)? == Some(hash.clone()) {
            return Ok(DocIngest::Unchanged);
        }

        let chunking = &self.config.chunking;
        let texts = chunk_text(&doc.content, chunking.chunk_size, chunking.chunk_overlap);
        if texts.is_empty() {
            return Err(DocbotError::ingestion(&doc.url, "no chunks produced"));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embedding.batch_size.max(1)) {
            let embedded = self.embedder.embed(batch).await.map_err(fail)?;
            if embedded.len() != batch.len() {
                return Err(DocbotError::ingestion(
                    &doc.url,
                    format!(
                        "embedding provider returned {} vectors for {} chunks",
                        embedded.len(),
                        batch.len()
                    ),
                ));
            }
            vectors.extend(embedded);
        }

        let processed_at = chrono::Utc::now();
        let total = texts.len();
        let entries: Vec<IndexEntry> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, embedding))| IndexEntry {
                id: chunk_id(&doc.url, i),
                text,
                embedding,
                metadata: ChunkMetadata {
                    url: doc.url.clone(),
                    doc_type: doc.doc_type,
                    chunk_index: i,
                    total_chunks: total,
                    processed_at,
                    content_hash: hash.clone(),
                },
            })
            .collect();

        // A shorter new version must not leave stale tail chunks behind.
        self.index
            .replace_source(&doc.url, &entries)
            .await
            .map_err(fail)?;

        Ok(DocIngest::Indexed { chunks: total })
    }

    /// Read one raw file and its sidecar. `Ok(None)` means there is no
    /// sidecar and the file is skipped.
    fn load_raw(&self, raw_path: &Path) -> Result<Option<Document>, DocbotError> {
        let meta_path = raw_path.with_extension("json");
        if !meta_path.exists() {
            return Ok(None);
        }

        let name = raw_path.display().to_string();
        let meta = read_meta(&meta_path).map_err(|e| DocbotError::ingestion(&name, e))?;
        let bytes = std::fs::read(raw_path).map_err(|e| DocbotError::ingestion(&meta.url, e))?;
        processor::process(&bytes, &meta.url, meta.content_type.as_deref())
            .map(Some)
            .map_err(|e| DocbotError::ingestion(&meta.url, e))
    }

    /// Ingest every raw file in `raw_dir`. Never fails because of a single
    /// document; only index-wide errors abort.
    pub async fn ingest_raw_dir(
        &self,
        raw_dir: &Path,
        reporter: &dyn IngestProgressReporter,
    ) -> IngestSummary {
        let files = list_raw_files(raw_dir);
        let total = files.len() as u64;
        let mut summary = IngestSummary {
            found: total,
            ..IngestSummary::default()
        };
        reporter.report(IngestProgressEvent::Discovered { total });

        for (i, raw_path) in files.iter().enumerate() {
            let (url, outcome, chunks) = match self.load_raw(raw_path) {
                Ok(None) => {
                    tracing::warn!(file = %raw_path.display(), "no metadata file, skipping");
                    summary.skipped += 1;
                    (raw_path.display().to_string(), DocOutcome::Skipped, 0)
                }
                Ok(Some(doc)) => match self.ingest_document(&doc).await {
                    Ok(DocIngest::Indexed { chunks }) => {
                        tracing::debug!(url = %doc.url, chunks, "indexed");
                        summary.indexed += 1;
                        summary.chunks_written += chunks as u64;
                        (doc.url, DocOutcome::Indexed, chunks as u64)
                    }
                    Ok(DocIngest::Unchanged) => {
                        summary.unchanged += 1;
                        (doc.url, DocOutcome::Unchanged, 0)
                    }
                    Err(e) => {
                        tracing::error!("{}", e);
                        summary.failed += 1;
                        (doc.url, DocOutcome::Failed, 0)
                    }
                },
                Err(e) => {
                    tracing::error!("{}", e);
                    summary.failed += 1;
                    (raw_path.display().to_string(), DocOutcome::Failed, 0)
                }
            };

            reporter.report(IngestProgressEvent::Document {
                url,
                outcome,
                chunks,
                n: i as u64 + 1,
                total,
            });
        }

        summary
    }
}

/// `docbot ingest`: process the raw cache into the on-disk index.
pub async fn run_ingest(config: &Config, rebuild: bool, progress: ProgressMode) -> Result<()> {
    let index = Arc::new(SqliteIndex::open(config).await?);
    let embedder = embedding::create_provider(&config.embedding)?;

    if rebuild {
        tracing::info!("rebuild requested, clearing index");
        index.clear().await?;
    }

    let raw_dir = &config.scraping.raw_dir;
    let ingester = Ingester::new(config, embedder, index.clone());
    let summary = ingester
        .ingest_raw_dir(raw_dir, progress.reporter().as_ref())
        .await;

    if summary.found == 0 {
        eprintln!("No raw files found in {}", raw_dir.display());
    }

    println!("ingest {}", raw_dir.display());
    println!("  documents found: {}", summary.found);
    println!("  indexed: {}", summary.indexed);
    println!("  unchanged: {}", summary.unchanged);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    println!("  chunks written: {}", summary.chunks_written);
    println!("ok");

    drop(ingester);
    if let Ok(index) = Arc::try_unwrap(index) {
        index.close().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::models::DocType;
    use crate::progress::NoProgress;
    use crate::store::{IndexHit, IndexRecord, InMemoryIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embeds text as `[word count, 1.0, 1.0, ...]` and counts calls.
    struct CountingEmbedder {
        model: &'static str,
        dims: usize,
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new(model: &'static str, dims: usize) -> Self {
            Self {
                model,
                dims,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![1.0; self.dims];
                    v[0] = t.split_whitespace().count() as f32;
                    v
                })
                .collect())
        }
    }

    /// Reads pass through; every write fails.
    struct ReadOnlyIndex(Arc<InMemoryIndex>);

    #[async_trait]
    impl VectorIndex for ReadOnlyIndex {
        async fn upsert(&self, _: &[IndexEntry]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn query(&self, embedding: &[f32], k: usize) -> anyhow::Result<Vec<IndexHit>> {
            self.0.query(embedding, k).await
        }
        async fn get_all(&self) -> anyhow::Result<Vec<IndexRecord>> {
            self.0.get_all().await
        }
        async fn source_hash(&self, url: &str) -> anyhow::Result<Option<String>> {
            self.0.source_hash(url).await
        }
        async fn delete_source(&self, url: &str) -> anyhow::Result<u64> {
            self.0.delete_source(url).await
        }
        async fn replace_source(&self, _: &str, _: &[IndexEntry]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn count(&self) -> anyhow::Result<usize> {
            self.0.count().await
        }
        async fn clear(&self) -> anyhow::Result<()> {
            self.0.clear().await
        }
    }

    fn config(chunk_size: usize, batch_size: usize) -> Config {
        parse_config(&format!(
            "[db]\npath = \"unused.sqlite\"\n\n[chunking]\nchunk_size = {}\nchunk_overlap = 0\n\n[embedding]\nbatch_size = {}\n",
            chunk_size, batch_size
        ))
        .unwrap()
    }

    fn doc(url: &str, content: &str) -> Document {
        Document {
            url: url.into(),
            doc_type: DocType::Text,
            content: content.into(),
        }
    }

    fn setup(config: &Config) -> (Ingester<'_>, Arc<InMemoryIndex>, Arc<CountingEmbedder>) {
        let index = Arc::new(InMemoryIndex::new());
        let embedder = Arc::new(CountingEmbedder::new("counting", 2));
        (
            Ingester::new(config, embedder.clone(), index.clone()),
            index,
            embedder,
        )
    }

    #[tokio::test]
    async fn chunks_get_contiguous_indices_and_metadata() {
        let cfg = config(4, 64);
        let (ingester, index, _) = setup(&cfg);
        let outcome = ingester
            .ingest_document(&doc("https://a.dev", "One two. Three four. Five six."))
            .await
            .unwrap();
        assert_eq!(outcome, DocIngest::Indexed { chunks: 2 });

        let records = index.get_all().await.unwrap();
        assert_eq!(records.len(), 2);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.id, format!("https://a.dev_{}", i));
            assert_eq!(r.metadata.chunk_index, i);
            assert_eq!(r.metadata.total_chunks, 2);
            assert_eq!(
                r.metadata.content_hash,
                content_hash(&ingester.index_settings(), "One two. Three four. Five six.")
            );
        }
    }

    #[tokio::test]
    async fn unchanged_document_is_not_reembedded() {
        let cfg = config(4, 64);
        let (ingester, _, embedder) = setup(&cfg);
        let d = doc("https://a.dev", "One two. Three four.");
        ingester.ingest_document(&d).await.unwrap();
        assert_eq!(
            ingester.ingest_document(&d).await.unwrap(),
            DocIngest::Unchanged
        );
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_document_replaces_all_chunks() {
        let cfg = config(2, 64);
        let (ingester, index, _) = setup(&cfg);
        ingester
            .ingest_document(&doc("https://a.dev", "One two. Three four. Five six."))
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 3);

        ingester
            .ingest_document(&doc("https://a.dev", "Seven eight."))
            .await
            .unwrap();
        let records = index.get_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Seven eight.");
        assert_eq!(records[0].metadata.total_chunks, 1);
    }

    #[tokio::test]
    async fn failed_reindex_keeps_previous_chunks() {
        let cfg = config(4, 64);
        let (ingester, index, embedder) = setup(&cfg);
        ingester
            .ingest_document(&doc("https://a.dev", "Old text."))
            .await
            .unwrap();

        let broken = Ingester::new(&cfg, embedder, Arc::new(ReadOnlyIndex(index.clone())));
        let err = broken
            .ingest_document(&doc("https://a.dev", "New text."))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));

        let records = index.get_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Old text.");
    }

    #[tokio::test]
    async fn new_embedding_model_reindexes_same_text() {
        let cfg = config(4, 64);
        let (ingester, index, _) = setup(&cfg);
        let d = doc("https://a.dev", "Same text.");
        ingester.ingest_document(&d).await.unwrap();

        let wider = Arc::new(CountingEmbedder::new("wider", 3));
        let reindexer = Ingester::new(&cfg, wider.clone(), index.clone());
        assert_eq!(
            reindexer.ingest_document(&d).await.unwrap(),
            DocIngest::Indexed { chunks: 1 }
        );
        assert_eq!(wider.calls.load(Ordering::SeqCst), 1);

        let hits = index.query(&[2.0, 1.0, 1.0], 1).await.unwrap();
        assert!(hits[0].distance < 1e-6);
        assert_eq!(
            reindexer.ingest_document(&d).await.unwrap(),
            DocIngest::Unchanged
        );
    }

    #[tokio::test]
    async fn new_chunk_size_reindexes_same_text() {
        let text = "One two. Three four. Five six.";
        let small = config(2, 64);
        let (ingester, index, embedder) = setup(&small);
        ingester.ingest_document(&doc("https://a.dev", text)).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 3);

        let large = config(50, 64);
        let reindexer = Ingester::new(&large, embedder, index.clone());
        assert_eq!(
            reindexer
                .ingest_document(&doc("https://a.dev", text))
                .await
                .unwrap(),
            DocIngest::Indexed { chunks: 1 }
        );
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn embeds_in_batches() {
        let cfg = config(2, 2);
        let (ingester, _, embedder) = setup(&cfg);
        ingester
            .ingest_document(&doc("https://a.dev", "A b. C d. E f. G h. I j."))
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn raw_dir_partial_failure_continues() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path();
        let write_pair = |name: &str, url: &str, body: &str| {
            std::fs::write(raw.join(format!("{}.raw", name)), body).unwrap();
            std::fs::write(
                raw.join(format!("{}.json", name)),
                serde_json::json!({"url": url, "content_type": "text/plain"}).to_string(),
            )
            .unwrap();
        };
        write_pair("a", "https://a.dev", "Good content here.");
        write_pair("b", "https://b.dev", "   \n\n  ");
        std::fs::write(raw.join("c.raw"), "no sidecar").unwrap();
        write_pair("d", "https://d.dev", "More good content.");

        let cfg = config(50, 64);
        let (ingester, index, _) = setup(&cfg);
        let summary = ingester.ingest_raw_dir(raw, &NoProgress).await;

        assert_eq!(
            summary,
            IngestSummary {
                found: 4,
                indexed: 2,
                unchanged: 0,
                skipped: 1,
                failed: 1,
                chunks_written: 2,
            }
        );
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = content_hash("model=m", "abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("model=m", "abc"));
        assert_ne!(h, content_hash("model=m", "abd"));
        assert_ne!(h, content_hash("model=n", "abc"));
    }
}
