//! Raw page downloader.
//!
//! Reads the URL list, skips URLs already in the raw cache, and downloads
//! the rest one at a time with per-domain rate limiting. Each download is
//! saved as a pair of files in `scraping.raw_dir`:
//!
//! ```text
//! {safe_url}_{YYYYMMDD_HHMMSS}.raw    response body
//! {safe_url}_{YYYYMMDD_HHMMSS}.json   {"url", "content_type", "timestamp"}
//! ```
//!
//! The `.json` sidecar is what both cache dedupe and ingestion read.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Config, ScrapingConfig};
use crate::models::RawPageMeta;

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub downloaded: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Read the URL list: one URL per line, blank lines and `#` comments skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list: {}", path.display()))?;
    Ok(parse_url_list(&content))
}

pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// URLs recorded in the `.json` sidecars of `raw_dir`. Unreadable sidecars
/// are logged and ignored.
pub fn cached_urls(raw_dir: &Path) -> HashSet<String> {
    let mut cached = HashSet::new();
    let entries = match std::fs::read_dir(raw_dir) {
        Ok(entries) => entries,
        Err(_) => return cached,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_meta(&path) {
            Ok(meta) => {
                cached.insert(meta.url);
            }
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "unreadable cache metadata"),
        }
    }
    cached
}

pub fn read_meta(path: &Path) -> Result<RawPageMeta> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn safe_url(url: &str) -> String {
    url.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Host (and port, if any) used as the rate limiting key.
pub fn domain_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            })
        })
        .unwrap_or_default()
}

/// Write `page` to `raw_dir` and return the path of the `.raw` file.
pub fn save_page(raw_dir: &Path, page: &FetchedPage) -> Result<PathBuf> {
    std::fs::create_dir_all(raw_dir)?;
    let now = chrono::Local::now();
    let base = format!("{}_{}", safe_url(&page.url), now.format("%Y%m%d_%H%M%S"));

    let raw_path = raw_dir.join(format!("{}.raw", base));
    std::fs::write(&raw_path, &page.body)
        .with_context(|| format!("Failed to write {}", raw_path.display()))?;

    let meta = RawPageMeta {
        url: page.url.clone(),
        content_type: page.content_type.clone(),
        timestamp: Some(now.to_rfc3339()),
    };
    std::fs::write(
        raw_dir.join(format!("{}.json", base)),
        serde_json::to_string_pretty(&meta)?,
    )?;

    Ok(raw_path)
}

pub struct Scraper<'a> {
    config: &'a ScrapingConfig,
    client: reqwest::Client,
    last_request: HashMap<String, Instant>,
}

impl<'a> Scraper<'a> {
    pub fn new(config: &'a ScrapingConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            headers.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("invalid header name: {}", name))?,
                reqwest::header::HeaderValue::from_str(value)
                    .with_context(|| format!("invalid value for header {}", name))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            last_request: HashMap::new(),
        })
    }

    /// Configured delay between requests to `domain`.
    pub fn delay_for(&self, domain: &str) -> Duration {
        let secs = self
            .config
            .delays
            .get(domain)
            .copied()
            .unwrap_or(self.config.default_delay_secs);
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Sleep for whatever remains of the domain's delay since the previous
    /// request to it, then record this request.
    async fn wait_for_rate_limit(&mut self, url: &str) {
        let domain = domain_of(url);
        let delay = self.delay_for(&domain);

        if !delay.is_zero() {
            if let Some(last) = self.last_request.get(&domain) {
                let elapsed = last.elapsed();
                if elapsed < delay {
                    tokio::time::sleep(delay - elapsed).await;
                }
            }
        }
        self.last_request.insert(domain, Instant::now());
    }

    pub async fn fetch(&mut self, url: &str) -> Result<FetchedPage> {
        self.wait_for_rate_limit(url).await;

        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(FetchedPage {
            url: url.to_string(),
            content_type,
            body,
        })
    }
}

/// Download every uncached URL in the configured URL list.
pub async fn run_scrape(config: &Config) -> Result<ScrapeSummary> {
    let scraping = &config.scraping;
    let mut summary = ScrapeSummary::default();

    let urls = match read_url_list(&scraping.urls_file) {
        Ok(urls) => urls,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("No URL list at {}", scraping.urls_file.display());
            return Ok(summary);
        }
    };
    if urls.is_empty() {
        eprintln!("No URLs found in {}", scraping.urls_file.display());
        return Ok(summary);
    }

    let cached = cached_urls(&scraping.raw_dir);
    let mut scraper = Scraper::new(scraping)?;

    println!("\nProcessing {} URLs...", urls.len());

    for url in &urls {
        if cached.contains(url) {
            println!("• Cached: {}", url);
            summary.cached += 1;
            continue;
        }

        let saved = match scraper.fetch(url).await {
            Ok(page) => save_page(&scraping.raw_dir, &page).map(|path| (path, page.body.len())),
            Err(e) => Err(e),
        };

        match saved {
            Ok((path, size)) => {
                tracing::debug!(url = %url, file = %path.display(), "saved");
                println!("✓ Downloaded: {} ({:.1}KB)", url, size as f64 / 1024.0);
                summary.downloaded += 1;
            }
            Err(e) => {
                tracing::error!(url = %url, "Failed to fetch: {:#}", e);
                println!("✗ Failed: {}", url);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
