use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docbot_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docbot"))
}

/// Temp project with a config, an empty raw cache dir, and no URL list.
/// `extra` is appended to the generated config.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data/raw")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docbot.sqlite"

[chunking]
chunk_size = 50
chunk_overlap = 10

[scraping]
urls_file = "{root}/urls.txt"
raw_dir = "{root}/data/raw"
{extra}"#,
        root = root.display().to_string().replace('\\', "/"),
        extra = extra
    );

    let config_path = config_dir.join("docbot.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_raw(root: &Path, name: &str, url: &str, body: &str) {
    let raw = root.join("data/raw");
    fs::write(raw.join(format!("{}.raw", name)), body).unwrap();
    fs::write(
        raw.join(format!("{}.json", name)),
        format!(
            r#"{{"url": "{}", "content_type": "text/plain", "timestamp": "2024-03-01T12:00:00"}}"#,
            url
        ),
    )
    .unwrap();
}

fn run_docbot(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docbot_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docbot binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_docbot(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docbot.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, _, success1) = run_docbot(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_docbot(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docbot(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_query_stats_on_empty_index() {
    let (_tmp, config_path) = setup_test_env("");
    run_docbot(&config_path, &["init"]);

    let (stdout, stderr, success) = run_docbot(&config_path, &["query"]);
    assert!(success, "query failed: {}", stderr);
    assert!(stdout.contains("No documents found"));

    let (stdout, _, success) = run_docbot(&config_path, &["query", "--list"]);
    assert!(success);
    assert!(stdout.contains("Found 0 unique documents"));
}

#[test]
fn test_query_and_list_conflict() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_docbot(&config_path, &["query", "text", "--list"]);
    assert!(!success);
    assert!(stderr.contains("cannot be used with"));
}

#[test]
fn test_ingest_with_disabled_embeddings_reports_failures() {
    let (tmp, config_path) = setup_test_env("");
    write_raw(tmp.path(), "a", "https://a.dev/guide", "Alpha guide text. It has two sentences.");
    write_raw(tmp.path(), "b", "https://b.dev/notes", "Beta notes.");
    fs::write(tmp.path().join("data/raw/orphan.raw"), "no sidecar").unwrap();

    let (stdout, stderr, success) =
        run_docbot(&config_path, &["ingest", "--progress", "json"]);
    assert!(success, "ingest aborted: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents found: 3"));
    assert!(stdout.contains("failed: 2"));
    assert!(stdout.contains("skipped: 1"));
    assert!(stdout.contains("chunks written: 0"));
    assert!(stdout.contains("ok"));
    assert!(stderr.contains(r#""phase":"discovered""#));
}

#[test]
fn test_ingest_empty_cache() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_docbot(&config_path, &["ingest", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("documents found: 0"));
    assert!(stderr.contains("No raw files found"));
}

#[test]
fn test_scrape_without_url_list() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_docbot(&config_path, &["scrape"]);
    assert!(success);
    assert!(stderr.contains("No URL list"));
}

#[test]
fn test_scrape_skips_cached_urls() {
    let (tmp, config_path) = setup_test_env("");
    write_raw(tmp.path(), "a", "https://a.dev/guide", "cached body");
    fs::write(
        tmp.path().join("urls.txt"),
        "# cached already\nhttps://a.dev/guide\n\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_docbot(&config_path, &["scrape"]);
    assert!(success, "scrape failed: {}", stderr);
    assert!(stdout.contains("Processing 1 URLs"));
    assert!(stdout.contains("• Cached: https://a.dev/guide"));
}

#[test]
fn test_chat_requires_llm_section() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_docbot(&config_path, &["chat"]);
    assert!(!success);
    assert!(stderr.contains("configuration error"));
    assert!(stderr.contains("[llm]"));
}

#[test]
fn test_incomplete_llm_section_only_blocks_chat() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[llm]
model = "claude-3-5-sonnet-latest"
"#,
    );
    let (_, stderr, success) = run_docbot(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);

    let (stdout, _, success) = run_docbot(&config_path, &["query", "--list"]);
    assert!(success);
    assert!(stdout.contains("Found 0 unique documents"));

    let (_, stderr, success) = run_docbot(&config_path, &["chat"]);
    assert!(!success);
    assert!(stderr.contains("configuration error"));
    assert!(stderr.contains("llm.max_tokens"));
    assert!(stderr.contains("llm.prompts.system"));
}

#[test]
fn test_chat_requires_api_key() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[llm]
model = "claude-3-5-sonnet-latest"
max_tokens = 512

[llm.prompts]
system = "Answer from the documentation."
query = "{context}\n\n{query}"
"#,
    );
    let (_, stderr, success) = run_docbot(&config_path, &["chat"]);
    assert!(!success);
    assert!(stderr.contains("ANTHROPIC_API_KEY"));
    assert!(stderr.contains("set your API credential"));
}
