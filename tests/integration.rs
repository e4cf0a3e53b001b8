use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pledge_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pledge");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let docs_dir = root.join("documents");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("a.json"),
        r#"{"term": 11, "session_period": 2, "meeting_index": 1,
            "subject": "行政院答復立法委員質詢",
            "content": "政府承諾於2026年將再生能源占比提升至20%，由經濟部負責推動。",
            "date": "2025-03-04"}"#,
    )
    .unwrap();
    fs::write(
        docs_dir.join("b.json"),
        r#"[{"id": "doc-b", "term": 11, "session_period": 2, "meeting_index": 2,
             "subject": "行政院答復立法委員質詢",
             "content": "長照2.0服務據點將於明年擴充至一千處。",
             "date": "2025-04-01"}]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/pledge.sqlite"

[segmenter]
chunk_size = 4000
overlap = 500

[oracle]
provider = "disabled"

[tracker]
checkpoint_dir = "{root}/data/checkpoints"

[documents]
root = "{root}/documents"
include_globs = ["**/*.json"]

[export]
records_dir = "{root}/data/commitments"
index_path = "{root}/data/index.json"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("pledge.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pledge(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pledge_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pledge binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pledge(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/pledge.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_pledge(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_pledge(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_extract_dry_run_needs_no_oracle() {
    let (_tmp, config_path) = setup_test_env();

    run_pledge(&config_path, &["init"]);
    let (stdout, stderr, success) = run_pledge(&config_path, &["extract", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("extract (dry-run)"));
    assert!(stdout.contains("processed: 2"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_extract_with_limit_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) =
        run_pledge(&config_path, &["extract", "--dry-run", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("processed: 1"));
}

#[test]
fn test_extract_fails_when_oracle_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_pledge(&config_path, &["init"]);
    let (_, stderr, success) = run_pledge(&config_path, &["extract"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_sweep_and_compact_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_pledge(&config_path, &["init"]);
    let (stdout, stderr, success) = run_pledge(&config_path, &["sweep", "--today", "2025-01-01"]);
    assert!(success, "sweep failed: {}", stderr);
    assert!(stdout.contains("sweep"));
    assert!(stdout.contains("updated: 0"));

    let (stdout, _, success) = run_pledge(&config_path, &["compact"]);
    assert!(success);
    assert!(stdout.contains("deleted: 0"));
}

#[test]
fn test_sweep_rejects_bad_date() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_pledge(&config_path, &["sweep", "--today", "01/01/2025"]);
    assert!(!success);
    assert!(stderr.contains("--today"), "stderr={}", stderr);
    assert!(stderr.contains("YYYY-MM-DD"), "stderr={}", stderr);
}

#[test]
fn test_unknown_progress_mode_is_a_usage_error() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_pledge(&config_path, &["--progress", "loud", "extract", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("loud"), "stderr={}", stderr);
    assert!(stderr.contains("human"), "stderr={}", stderr);

    let (stdout, _, success) =
        run_pledge(&config_path, &["--progress", "json", "extract", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("processed: 2"));
}

#[test]
fn test_index_on_empty_store() {
    let (tmp, config_path) = setup_test_env();

    run_pledge(&config_path, &["init"]);
    let (stdout, stderr, success) = run_pledge(&config_path, &["index"]);
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("commitments: 0"));

    let json = fs::read_to_string(tmp.path().join("data/index.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["total_count"], 0);
    assert_eq!(value["status_summary"]["tracking"], 0);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();

    run_pledge(&config_path, &["init"]);
    let (stdout, _, success) = run_pledge(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Commitments:  0"));
}

#[test]
fn test_get_missing_commitment() {
    let (_tmp, config_path) = setup_test_env();

    run_pledge(&config_path, &["init"]);
    let (_, stderr, success) = run_pledge(&config_path, &["get", "does-not-exist"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_segment_without_config() {
    let (tmp, _config_path) = setup_test_env();
    let missing_config = tmp.path().join("nope.toml");
    let doc = tmp.path().join("documents/a.json");

    let (stdout, stderr, success) = run_pledge(&missing_config, &["segment", doc.to_str().unwrap()]);
    assert!(success, "segment failed: {}", stderr);
    assert!(stdout.contains("chunks: 1"));
    assert!(stdout.contains("[single]"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _config_path) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        "[db]\npath = \"x.sqlite\"\n\n[segmenter]\nchunk_size = 100\noverlap = 100\n",
    )
    .unwrap();

    let (_, stderr, success) = run_pledge(&bad, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr={}", stderr);
}
