use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lmill_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lmill");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Fetched-newsletter fixtures
    let new_dir = root.join("new");
    fs::create_dir_all(&new_dir).unwrap();
    fs::write(
        new_dir.join("Mon 2 Jan 2023 080000 0700 PDT Weekly Digest.html"),
        "<html><body><h1>Weekly Digest</h1>\
         <p>Rust 1.70 shipped this week with faster compile times.</p>\
         <p>The cargo team announced sparse registry support.</p></body></html>",
    )
    .unwrap();
    fs::write(
        new_dir.join("Tue 3 Jan 2023 080000 0700 PDT Infra Notes.html"),
        "<html><body><p>Kubernetes upgrades and Docker news.</p>\
         <script>track()</script></body></html>",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/lettermill.sqlite"

[dirs]
new_dir = "{root}/new"
archive_dir = "{root}/archive"

[chunking]
chunk_chars = 256
overlap_chars = 16
"#,
        root = root.display()
    );

    let config_path = config_dir.join("lettermill.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lmill(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lmill_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lmill binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lmill(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lmill(&config_path, &["init"]);
    let (_, _, success2) = run_lmill(&config_path, &["init"]);
    assert!(success1);
    assert!(success2);
}

#[test]
fn test_init_creates_missing_parent_dirs() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_content = format!(
        r#"[db]
path = "{root}/state/deep/lettermill.sqlite"

[dirs]
new_dir = "{root}/new"
archive_dir = "{root}/archive"

[chunking]
chunk_chars = 256
overlap_chars = 16
"#,
        root = root.display()
    );
    let config_path = root.join("lettermill.toml");
    fs::write(&config_path, config_content).unwrap();

    let (stdout, stderr, success) = run_lmill(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(root.join("state/deep/lettermill.sqlite").exists());
}

#[test]
fn test_sync_image_only_email_stores_no_chunks() {
    let (tmp, config_path) = setup_test_env();

    fs::write(
        tmp.path().join("new/Wed 4 Jan 2023 080000 0700 PDT Picture Post.html"),
        "<html><body><img src=\"banner.png\"></body></html>",
    )
    .unwrap();

    run_lmill(&config_path, &["init"]);
    let (stdout, stderr, success) = run_lmill(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted documents: 3"));

    let (doc_count, chunk_count) = with_pool(&config_path, |pool| async move {
        let docs = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM documents WHERE source_id LIKE '%Picture Post%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let chunks = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chunks WHERE document_id IN \
             (SELECT id FROM documents WHERE source_id LIKE '%Picture Post%')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        (docs, chunks)
    });
    assert_eq!(doc_count, 1);
    assert_eq!(chunk_count, 0);
}

#[test]
fn test_sync_dry_run_counts_without_writing() {
    let (tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    let (stdout, _, success) = run_lmill(&config_path, &["sync", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("files found: 2"));
    assert!(stdout.contains("estimated chunks:"));

    // Dry run leaves the database empty
    let db = tmp.path().join("data/lettermill.sqlite");
    assert!(db.exists());
    let (stdout, _, _) = run_lmill(&config_path, &["sync", "--dry-run"]);
    assert!(stdout.contains("files found: 2"));
}

#[test]
fn test_sync_indexes_documents_without_embeddings() {
    let (_tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    let (stdout, stderr, success) = run_lmill(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted documents: 2"));
    assert!(stdout.contains("chunks written:"));
    // Embeddings are disabled in this config, so no embedding lines
    assert!(!stdout.contains("embeddings written"));
}

#[test]
fn test_sync_twice_replaces_rather_than_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    run_lmill(&config_path, &["sync"]);
    let (stdout, _, success) = run_lmill(&config_path, &["sync"]);
    assert!(success);
    // Same two files, same two documents
    assert!(stdout.contains("upserted documents: 2"));

    let count = with_pool(&config_path, |pool| async move {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap()
    });
    assert_eq!(count, 2);
}

#[test]
fn test_sync_limit() {
    let (_tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    let (stdout, _, success) = run_lmill(&config_path, &["sync", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("upserted documents: 1"));
}

#[test]
fn test_archive_moves_files() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lmill(&config_path, &["archive"]);
    assert!(success);
    assert!(stdout.contains("files moved: 2"));

    assert_eq!(fs::read_dir(tmp.path().join("new")).unwrap().count(), 0);
    assert_eq!(fs::read_dir(tmp.path().join("archive")).unwrap().count(), 2);

    // Sync after archive sees nothing
    run_lmill(&config_path, &["init"]);
    let (stdout, _, _) = run_lmill(&config_path, &["sync"]);
    assert!(stdout.contains("files loaded: 0"));
}

#[test]
fn test_get_prints_document_and_chunks() {
    let (_tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    run_lmill(&config_path, &["sync"]);

    let doc_id = with_pool(&config_path, |pool| async move {
        sqlx::query_scalar::<_, String>(
            "SELECT id FROM documents WHERE source_id LIKE '%Weekly Digest%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap()
    });

    let (stdout, _, success) = run_lmill(&config_path, &["get", &doc_id]);
    assert!(success);
    assert!(stdout.contains("--- Document ---"));
    assert!(stdout.contains("Weekly Digest"));
    assert!(stdout.contains("Rust 1.70 shipped"));
    assert!(stdout.contains("--- Chunks ("));
    // HTML structure must be gone from the stored body
    assert!(!stdout.contains("<p>"));
    assert!(!stdout.contains("track()"));
}

#[test]
fn test_get_unknown_id_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    let (_, stderr, success) = run_lmill(&config_path, &["get", "no-such-id"]);
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_search_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();

    run_lmill(&config_path, &["init"]);
    let (_, stderr, success) = run_lmill(&config_path, &["search", "rust"]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"));
}

#[test]
fn test_fetch_requires_label() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_lmill(&config_path, &["fetch"]);
    assert!(!success);
    assert!(stderr.contains("label_id"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_lmill(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("config"));
}

/// Open the test database directly for row-level assertions.
fn with_pool<F, Fut, T>(config_path: &Path, f: F) -> T
where
    F: FnOnce(sqlx::SqlitePool) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let config = lettermill::config::load_config(config_path).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let pool = lettermill::db::connect(&config).await.unwrap();
        let out = f(pool.clone()).await;
        pool.close().await;
        out
    })
}
