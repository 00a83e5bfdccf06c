//! Ingestion progress reporting.
//!
//! Progress is emitted on **stderr** so stdout remains parseable for
//! scripts. Three modes: human-readable lines, JSON lines, or nothing.

use std::io::Write;

/// Outcome of a single document during ingestion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocOutcome {
    Indexed,
    Unchanged,
    Skipped,
    Failed,
}

impl DocOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocOutcome::Indexed => "indexed",
            DocOutcome::Unchanged => "unchanged",
            DocOutcome::Skipped => "skipped",
            DocOutcome::Failed => "failed",
        }
    }
}

/// A single progress event for ingestion.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Raw files discovered in the cache directory.
    Discovered { total: u64 },
    /// Document `n` of `total` finished with `outcome`.
    Document {
        url: String,
        outcome: DocOutcome,
        chunks: u64,
        n: u64,
        total: u64,
    },
}

/// Reports ingestion progress. Implementations write to stderr.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  12 / 1,300  indexed  https://..."
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovered { total } => {
                format!("ingest  found {} raw documents\n", format_number(*total))
            }
            IngestProgressEvent::Document {
                url,
                outcome,
                chunks,
                n,
                total,
            } => match outcome {
                DocOutcome::Indexed => format!(
                    "ingest  {} / {}  {}  {} ({} chunks)\n",
                    format_number(*n),
                    format_number(*total),
                    outcome.as_str(),
                    url,
                    chunks
                ),
                _ => format!(
                    "ingest  {} / {}  {}  {}\n",
                    format_number(*n),
                    format_number(*total),
                    outcome.as_str(),
                    url
                ),
            },
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Discovered { total } => serde_json::json!({
                "event": "progress",
                "phase": "discovered",
                "total": total
            }),
            IngestProgressEvent::Document {
                url,
                outcome,
                chunks,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "url": url,
                "outcome": outcome.as_str(),
                "chunks": chunks,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::from(&digits[..head]);
    for group in digits.as_bytes()[head..].chunks(3) {
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(std::str::from_utf8(group).unwrap_or_default());
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
