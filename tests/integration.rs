use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docqa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("service_agreement.md"),
        "# Service Agreement\n\nClause 1. Payment terms.\n\nPayment is due within thirty days \
         of the invoice date. Late payments accrue interest.\n\nClause 2. Termination.\n\n\
         Either party may terminate this agreement with sixty days written notice. \
         Termination conditions include material breach and insolvency.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("privacy_policy.txt"),
        "Privacy Policy\n\nPersonal data is processed only for providing the service.\n\n\
         Data is retained for no longer than two years after the contract ends.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docqa.db"

[docs]
root = "{root}/docs"
include_globs = ["**/*.md", "**/*.txt"]

[chunking]
chunk_size = 200
overlap = 40

[retrieval]
top_k = 3

[server]
bind = "127.0.0.1:7431"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_docqa(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));

    let (_, stderr, ok) = run_docqa(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_ingest_then_search() {
    let (_tmp, config) = setup_test_env();

    run_docqa(&config, &["init"]);
    let (stdout, stderr, ok) = run_docqa(&config, &["ingest"]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("Ingested 2 documents"), "got: {}", stdout);
    assert!(stdout.contains("generation 1"));

    // A lexically specific query ranks the termination clause first.
    let (stdout, stderr, ok) = run_docqa(&config, &["search", "termination conditions"]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("service_agreement"), "got: {}", stdout);
    let first_line = stdout.lines().next().unwrap_or_default();
    assert!(first_line.starts_with("1."));
}

#[test]
fn test_reingest_unchanged_corpus_is_skipped() {
    let (_tmp, config) = setup_test_env();

    run_docqa(&config, &["init"]);
    run_docqa(&config, &["ingest"]);

    let (stdout, stderr, ok) = run_docqa(&config, &["ingest"]);
    assert!(ok, "re-ingest failed: {}", stderr);
    assert!(stdout.contains("unchanged"), "got: {}", stdout);

    let (stdout, _, ok) = run_docqa(&config, &["ingest", "--force"]);
    assert!(ok);
    assert!(stdout.contains("generation 2"), "got: {}", stdout);
}

#[test]
fn test_stats_reports_corpus() {
    let (_tmp, config) = setup_test_env();

    run_docqa(&config, &["init"]);
    let (stdout, _, ok) = run_docqa(&config, &["stats"]);
    assert!(ok);
    assert!(stdout.contains("Documents:      0"));
    assert!(stdout.contains("never"));

    run_docqa(&config, &["ingest"]);
    let (stdout, stderr, ok) = run_docqa(&config, &["stats"]);
    assert!(ok, "stats failed: {}", stderr);
    assert!(stdout.contains("Documents:      2"), "got: {}", stdout);
    assert!(stdout.contains("Generation:     1"));
}

#[test]
fn test_search_empty_corpus() {
    let (_tmp, config) = setup_test_env();

    run_docqa(&config, &["init"]);
    let (stdout, stderr, ok) = run_docqa(&config, &["search", "anything"]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(
        &bad,
        r#"[db]
path = "x.db"
[docs]
root = "."
[chunking]
chunk_size = 100
overlap = 100
[server]
bind = "127.0.0.1:7432"
"#,
    )
    .unwrap();

    let (_, stderr, ok) = run_docqa(&bad, &["stats"]);
    assert!(!ok);
    assert!(stderr.contains("overlap"), "got: {}", stderr);
}
