//! `docbot query`: search the index, list documents, or show statistics.
//!
//! ```text
//! $ docbot query "how do I configure retries?" -n 2
//!
//! --------------------------------------------------------------------------------
//! Result 1 (Relevance: 83.12%)
//! Source: https://docs.example.dev/retries
//! Content: Retries are configured per client...
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding;
use crate::models::SearchResult;
use crate::retrieve::Retriever;
use crate::store::{IndexRecord, SqliteIndex, VectorIndex};

const PREVIEW_CHARS: usize = 200;
const RULE: &str = "--------------------------------------------------------------------------------";

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Print ranked results with relevance, source, and a content preview.
/// `verbose` adds chunk position and processing time.
pub fn write_results(
    out: &mut impl Write,
    results: &[SearchResult],
    verbose: bool,
) -> std::io::Result<()> {
    writeln!(out, "\n{}", RULE)?;
    for (i, r) in results.iter().enumerate() {
        writeln!(out, "Result {} (Relevance: {:.2}%)", i + 1, r.relevance * 100.0)?;
        writeln!(out, "Source: {}", r.chunk.source_url)?;
        if verbose {
            writeln!(
                out,
                "Chunk: {}/{}  processed {}",
                r.chunk.index + 1,
                r.chunk.total_chunks,
                r.chunk.created_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        writeln!(out, "Content: {}", preview(&r.chunk.text))?;
        writeln!(out, "\n{}", RULE)?;
    }
    Ok(())
}

/// Aggregate view of the index for `docbot query` with no arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    /// Chunk count per source URL, sorted by URL.
    pub documents: BTreeMap<String, usize>,
    pub total_chunks: usize,
    pub first_processed: Option<DateTime<Utc>>,
    pub last_processed: Option<DateTime<Utc>>,
}

impl IndexStats {
    pub fn from_records(records: &[IndexRecord]) -> Self {
        let mut documents = BTreeMap::new();
        for r in records {
            *documents.entry(r.metadata.url.clone()).or_insert(0) += 1;
        }
        Self {
            documents,
            total_chunks: records.len(),
            first_processed: records.iter().map(|r| r.metadata.processed_at).min(),
            last_processed: records.iter().map(|r| r.metadata.processed_at).max(),
        }
    }

    pub fn average_chunks(&self) -> f64 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_chunks as f64 / self.documents.len() as f64
        }
    }

    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.documents.is_empty() {
            writeln!(out, "No documents found. Run `docbot scrape` and `docbot ingest` first.")?;
            return Ok(());
        }

        writeln!(out, "\n=== Document Database Statistics ===")?;
        writeln!(out, "Total Documents: {}", self.documents.len())?;
        writeln!(out, "Total Chunks: {}", self.total_chunks)?;
        writeln!(out, "Average Chunks per Document: {:.1}", self.average_chunks())?;

        if let (Some(first), Some(last)) = (self.first_processed, self.last_processed) {
            writeln!(out, "\nDate Range:")?;
            writeln!(out, "  First Added: {}", first.format("%Y-%m-%d %H:%M:%S"))?;
            writeln!(out, "  Last Added: {}", last.format("%Y-%m-%d %H:%M:%S"))?;
        }

        writeln!(out, "\nDocument List:")?;
        for (url, chunks) in &self.documents {
            writeln!(out, "• {} ({} chunks)", url, chunks)?;
        }
        Ok(())
    }
}

pub fn write_document_list(out: &mut impl Write, records: &[IndexRecord]) -> std::io::Result<()> {
    let stats = IndexStats::from_records(records);
    writeln!(out, "\nFound {} unique documents:", stats.documents.len())?;
    for url in stats.documents.keys() {
        writeln!(out, "• {}", url)?;
    }
    Ok(())
}

pub async fn run_query(
    config: &Config,
    query: Option<&str>,
    list: bool,
    num_results: usize,
    verbose: bool,
) -> Result<()> {
    let index = Arc::new(SqliteIndex::open(config).await?);

    match query {
        Some(q) if !list => {
            let embedder = embedding::create_provider(&config.embedding)?;
            let retriever = Retriever::new(embedder, index.clone());
            let results = retriever.search(q, num_results).await?;
            let mut stdout = std::io::stdout().lock();
            if results.is_empty() {
                writeln!(stdout, "No results.")?;
            } else {
                write_results(&mut stdout, &results, verbose)?;
            }
        }
        _ if list => {
            let records = index.get_all().await?;
            write_document_list(&mut std::io::stdout().lock(), &records)?;
        }
        _ => {
            let records = index.get_all().await?;
            IndexStats::from_records(&records).write_to(&mut std::io::stdout().lock())?;
        }
    }

    Ok(())
}
