use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kbe_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_kbe"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("hours.txt"),
        "Opening hours: we open at nine and close at five on weekdays.\r\nWeekend hours vary.",
    )
    .unwrap();
    fs::write(
        files_dir.join("parking.txt"),
        "Parking is free in the underground garage after six in the evening.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/kbe.sqlite"

[chunking]
max_chars = 900
overlap_chars = 120

[retrieval]
default_k = 3

[embedding]
provider = "hashing"
dims = 256
"#,
        root.display()
    );

    let config_path = config_dir.join("kbe.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kbe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kbe_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kbe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run `create --json` and return the new document ID.
fn create(config_path: &Path, tenant: &str, title: &str, file: &Path) -> String {
    let (stdout, stderr, success) = run_kbe(
        config_path,
        &[
            "create",
            "--tenant",
            tenant,
            "--title",
            title,
            "--file",
            file.to_str().unwrap(),
            "--json",
        ],
    );
    assert!(success, "create failed: stdout={}, stderr={}", stdout, stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["chunk_count"], 1);
    json["document_id"].as_str().unwrap().to_string()
}

fn file(config_path: &Path, name: &str) -> PathBuf {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kbe(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kbe(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kbe(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_kbe(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_create_and_retrieve() {
    let (_tmp, config_path) = setup_test_env();
    run_kbe(&config_path, &["init"]);

    create(&config_path, "t1", "Hours", &file(&config_path, "hours.txt"));
    create(&config_path, "t1", "Parking", &file(&config_path, "parking.txt"));

    let (stdout, stderr, success) = run_kbe(
        &config_path,
        &["retrieve", "--tenant", "t1", "--k", "1", "underground garage parking"],
    );
    assert!(success, "retrieve failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("[Source 1]\n"));
    assert!(stdout.contains("underground garage"));
    assert!(!stdout.contains("[Source 2]"));
}

#[test]
fn test_retrieve_is_tenant_scoped() {
    let (_tmp, config_path) = setup_test_env();
    run_kbe(&config_path, &["init"]);

    create(&config_path, "t1", "Parking", &file(&config_path, "parking.txt"));

    let (stdout, _, success) = run_kbe(
        &config_path,
        &["retrieve", "--tenant", "t2", "parking garage"],
    );
    assert!(success);
    assert_eq!(stdout.trim(), "No relevant context found.");
}

#[test]
fn test_update_then_chunks() {
    let (_tmp, config_path) = setup_test_env();
    run_kbe(&config_path, &["init"]);
    let id = create(&config_path, "t1", "Hours", &file(&config_path, "hours.txt"));

    let (stdout, stderr, success) = run_kbe(
        &config_path,
        &[
            "update",
            &id,
            "--tenant",
            "t1",
            "--title",
            "Holiday hours",
            "--content",
            "Closed on public holidays.",
        ],
    );
    assert!(success, "update failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("(1 chunks)"));

    let (stdout, _, success) = run_kbe(&config_path, &["chunks", &id, "--tenant", "t1"]);
    assert!(success);
    assert!(stdout.contains("Holiday hours"));
    assert!(stdout.contains("Closed on public holidays."));
    assert!(!stdout.contains("Opening hours"));
    assert!(stdout.contains("(256 dims)"));
}

#[test]
fn test_update_wrong_tenant_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_kbe(&config_path, &["init"]);
    let id = create(&config_path, "t1", "Hours", &file(&config_path, "hours.txt"));

    let (_, stderr, success) = run_kbe(
        &config_path,
        &[
            "update", &id, "--tenant", "t2", "--title", "x", "--content", "y",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_delete_then_retrieve_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_kbe(&config_path, &["init"]);
    let id = create(&config_path, "t1", "Parking", &file(&config_path, "parking.txt"));

    let (stdout, _, success) = run_kbe(&config_path, &["delete", &id, "--tenant", "t1"]);
    assert!(success);
    assert!(stdout.contains("Deleted document"));

    let (stdout, _, success) = run_kbe(
        &config_path,
        &["retrieve", "--tenant", "t1", "--json", "parking"],
    );
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["passages"].as_array().unwrap().len(), 0);

    let (_, _, success) = run_kbe(&config_path, &["chunks", &id, "--tenant", "t1"]);
    assert!(!success);
}

#[test]
fn test_create_blank_content_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_kbe(&config_path, &["init"]);

    let (_, stderr, success) = run_kbe(
        &config_path,
        &["create", "--tenant", "t1", "--title", "Empty", "--content", "   "],
    );
    assert!(!success);
    assert!(stderr.contains("validation error"));
}

#[test]
fn test_disabled_provider_fails_closed() {
    let (tmp, config_path) = setup_test_env();
    let config = fs::read_to_string(&config_path)
        .unwrap()
        .replace("provider = \"hashing\"", "provider = \"disabled\"");
    fs::write(&config_path, config).unwrap();
    run_kbe(&config_path, &["init"]);

    let (stdout, stderr, success) = run_kbe(&config_path, &["retrieve", "--tenant", "t1", "hours"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("retrieval unavailable"));
    drop(tmp);
}
