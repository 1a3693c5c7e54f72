use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn weave_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("weave");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Beta plain text file.\n\nContains notes about deployment and infrastructure.",
    )
    .unwrap();
    fs::write(
        files_dir.join("nested").join("gamma.markdown"),
        "Gamma notes on Kubernetes and Docker.",
    )
    .unwrap();
    fs::write(files_dir.join("image.png"), [0u8, 1, 2, 3]).unwrap();
    fs::write(files_dir.join("empty.txt"), "").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/weave.sqlite"

[splitter]
chunk_size = 200
chunk_overlap = 20

[retrieval]
top_k = 3
similarity_threshold = 0.5

[embedding]
provider = "disabled"

[llm]
provider = "disabled"

[server]
bind = "127.0.0.1:7341"

[log]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("weave.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_weave(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = weave_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run weave binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Register `file` and return the id printed by `doc add`.
fn add_document(config_path: &Path, file: &Path) -> String {
    let (stdout, stderr, success) = run_weave(config_path, &["doc", "add", file.to_str().unwrap()]);
    assert!(success, "doc add failed: stdout={}, stderr={}", stdout, stderr);
    let open = stdout.rfind('(').expect("id in output");
    let close = stdout.rfind(')').expect("id in output");
    stdout[open + 1..close].to_string()
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_weave(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("weave.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_weave(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_weave(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _config_path) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[splitter]\nchunk_size = 100\nchunk_overlap = 100\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_weave(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn test_doc_add_get_list_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_weave(&config_path, &["init"]);

    let doc_id = add_document(&config_path, &files_dir(&config_path).join("alpha.md"));
    assert_eq!(doc_id.len(), 64, "expected a sha256 hex id, got {}", doc_id);

    let (stdout, _, success) = run_weave(&config_path, &["doc", "get", &doc_id]);
    assert!(success);
    assert!(stdout.contains("name: alpha.md"));
    assert!(stdout.contains("type: .md"));
    assert!(stdout.contains("rag_state: pending"));

    let (stdout, _, success) = run_weave(&config_path, &["doc", "list"]);
    assert!(success);
    assert!(stdout.contains(&doc_id));
    assert!(stdout.contains("1 documents total"));

    let (stdout, _, success) = run_weave(&config_path, &["doc", "delete", &doc_id]);
    assert!(success);
    assert!(stdout.contains("Deleted"));

    let (_, stderr, success) = run_weave(&config_path, &["doc", "get", &doc_id]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_doc_add_duplicate_path_conflicts() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("beta.txt");

    add_document(&config_path, &file);
    let (_, stderr, success) = run_weave(&config_path, &["doc", "add", file.to_str().unwrap()]);
    assert!(!success, "duplicate add should fail");
    assert!(stderr.contains("already exists"), "stderr: {}", stderr);
}

#[test]
fn test_doc_add_missing_file() {
    let (_tmp, config_path) = setup_test_env();
    let missing = files_dir(&config_path).join("nope.txt");

    let (_, stderr, success) = run_weave(&config_path, &["doc", "add", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_doc_add_custom_name() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("alpha.md");

    let (stdout, _, success) = run_weave(
        &config_path,
        &["doc", "add", file.to_str().unwrap(), "--name", "Rust Notes"],
    );
    assert!(success);
    assert!(stdout.contains("Registered Rust Notes"));
}

#[test]
fn test_doc_import_walks_directory() {
    let (_tmp, config_path) = setup_test_env();
    let dir = files_dir(&config_path);

    let (stdout, stderr, success) = run_weave(&config_path, &["doc", "import", dir.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    // image.png is not importable
    assert!(stdout.contains("registered: 4"), "stdout: {}", stdout);
    assert!(stdout.contains("skipped: 0"), "stdout: {}", stdout);

    let (stdout, _, success) = run_weave(&config_path, &["doc", "import", dir.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("registered: 0"));
    assert!(stdout.contains("skipped: 4"));
}

#[test]
fn test_doc_process_without_embeddings_stays_pending() {
    let (_tmp, config_path) = setup_test_env();
    let doc_id = add_document(&config_path, &files_dir(&config_path).join("alpha.md"));

    let (_, stderr, success) = run_weave(&config_path, &["doc", "process", &doc_id]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    let (stdout, _, _) = run_weave(&config_path, &["doc", "get", &doc_id]);
    assert!(stdout.contains("rag_state: pending"));
}

#[test]
fn test_sync_reports_failures() {
    let (_tmp, config_path) = setup_test_env();
    add_document(&config_path, &files_dir(&config_path).join("alpha.md"));

    let (stdout, stderr, success) = run_weave(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("processed: 0"));
    assert!(stdout.contains("failed: 1"));
}

#[test]
fn test_query_requires_embeddings() {
    let (_tmp, config_path) = setup_test_env();
    run_weave(&config_path, &["init"]);

    let (_, stderr, success) = run_weave(&config_path, &["query", "what is rust?"]);
    assert!(!success);
    assert!(stderr.contains("unsupported"), "stderr: {}", stderr);
}

#[test]
fn test_chat_add_list_delete() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_weave(&config_path, &["chat", "add", "user", "hello there"]);
    assert!(success, "chat add failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index: 0"));

    let (stdout, _, success) = run_weave(
        &config_path,
        &["chat", "add", "assistant", "hi", "--metadata", r#"{"session":"s1"}"#],
    );
    assert!(success);
    assert!(stdout.contains("index: 1"));

    let (stdout, _, success) = run_weave(&config_path, &["chat", "list", "--role", "user"]);
    assert!(success);
    assert!(stdout.contains("hello there"));
    assert!(!stdout.contains(" hi"));

    let (stdout, _, success) = run_weave(&config_path, &["chat", "list"]);
    assert!(success);
    let first = stdout.lines().next().unwrap();
    assert!(first.contains("user"), "conversation order, got: {}", first);

    let (_, _, success) = run_weave(&config_path, &["chat", "delete", "1"]);
    assert!(success);
    let (_, stderr, success) = run_weave(&config_path, &["chat", "delete", "1"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_chat_rejects_unknown_role() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_weave(&config_path, &["chat", "add", "robot", "beep"]);
    assert!(!success);
    assert!(stderr.contains("robot"), "stderr: {}", stderr);
}

#[test]
fn test_graph_sync_and_status() {
    let (_tmp, config_path) = setup_test_env();
    let doc_id = add_document(&config_path, &files_dir(&config_path).join("beta.txt"));

    let (stdout, stderr, success) = run_weave(&config_path, &["graph", "sync", &doc_id]);
    assert!(success, "graph sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("entities: 0"));

    let (stdout, _, success) = run_weave(&config_path, &["doc", "get", &doc_id]);
    assert!(success);
    assert!(stdout.contains("entity_state: synced"));

    let (stdout, _, success) = run_weave(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Documents:   1"));
    assert!(stdout.contains("in graph:  1 / 1"));
    assert!(stdout.contains("1 nodes"));
}

#[test]
fn test_graph_sync_unknown_document() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_weave(&config_path, &["graph", "sync", "missing"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}
