//! End-to-end tests of the `voxrag` binary.
//!
//! Each test gets its own temp directory with a config file pointing the
//! database and file storage inside it. Embeddings and vision are disabled
//! so the tests run offline; retrieval relies on keyword scoring.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn voxrag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_voxrag"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();

    fs::write(
        files_dir.join("warranty.txt"),
        "Product care guide.\n\nThe warranty is 24 months. Keep your receipt.",
    )
    .unwrap();
    fs::write(files_dir.join("people.csv"), "Name,Age\nAlice,30\nBob,25\n").unwrap();

    let config_content = format!(
        r#"[storage]
root = "{root}/data/uploads"
db_path = "{root}/data/voxrag.sqlite"

[embedding]
provider = "disabled"

[vision]
provider = "disabled"

[vector_store]
backend = "local"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("voxrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_voxrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = voxrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run voxrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, success) = run_voxrag(config_path, args);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("{:?} printed invalid JSON ({}): {}", args, e, stdout))
}

fn ingest(tmp: &TempDir, config_path: &Path, file: &str) -> String {
    let path = tmp.path().join("files").join(file);
    let json = run_json(config_path, &["ingest", path.to_str().unwrap()]);
    assert_eq!(json["success"], true, "{}", json);
    json["document_id"].as_str().unwrap().to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_voxrag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Initialized"));
    assert!(tmp.path().join("data/voxrag.sqlite").exists());

    let (_, _, again) = run_voxrag(&config_path, &["init"]);
    assert!(again, "second init failed (not idempotent)");
}

#[test]
fn test_ingest_moves_file_and_search_finds_it() {
    let (tmp, config_path) = setup_test_env();
    let id = ingest(&tmp, &config_path, "warranty.txt");
    assert!(!tmp.path().join("files/warranty.txt").exists());

    let json = run_json(&config_path, &["search", "warranty period", "--limit", "3"]);
    assert_eq!(json["success"], true);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["document_id"], id.as_str());
    assert!(results[0]["hybrid_score"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_csv_rows_are_searchable() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path, "people.csv");

    let json = run_json(&config_path, &["search", "Bob age"]);
    let results = json["results"].as_array().unwrap();
    assert!(results
        .iter()
        .any(|r| r["content"].as_str().unwrap_or_default().contains("Bob: 25")));
}

#[test]
fn test_list_get_delete_lifecycle() {
    let (tmp, config_path) = setup_test_env();
    let id = ingest(&tmp, &config_path, "warranty.txt");

    let list = run_json(&config_path, &["list"]);
    let docs = list.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["file_name"], "warranty.txt");

    let got = run_json(&config_path, &["get", &id]);
    assert_eq!(got["success"], true);
    assert!(got["document"]["content"]
        .as_str()
        .unwrap()
        .contains("24 months"));

    let deleted = run_json(&config_path, &["delete", &id]);
    assert_eq!(deleted["success"], true);

    let got = run_json(&config_path, &["get", &id]);
    assert_eq!(got["success"], false);
    assert_eq!(got["error_kind"], "not_found");

    let stats = run_json(&config_path, &["stats"]);
    assert_eq!(stats["total_documents"], 0);
    assert_eq!(stats["active_backend"], "local");
}

#[test]
fn test_ask_without_relevant_content() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path, "warranty.txt");

    let json = run_json(&config_path, &["ask", "55 inch TV dimensions"]);
    assert_eq!(json["success"], false);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("No relevant information found"));
}

#[test]
fn test_clear_removes_everything() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path, "warranty.txt");
    ingest(&tmp, &config_path, "people.csv");

    let json = run_json(&config_path, &["clear"]);
    assert_eq!(json["success"], true);
    assert!(json["message"].as_str().unwrap().contains("Cleared 2 documents"));
    assert!(run_json(&config_path, &["list"]).as_array().unwrap().is_empty());
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[embedding]\nprovider = \"telepathy\"\n").unwrap();

    let (_, stderr, success) = run_voxrag(&bad, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}
