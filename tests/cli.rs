//! Runs the compiled `ragchat` binary against the mock service.

mod common;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn ragchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragchat"))
}

fn write_config(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("ragchat.toml");
    fs::write(
        &config_path,
        format!(
            r#"[backend]
base_url = "{}"
timeout_secs = 5

[session]
default_namespace = "default"

[ingest]
status_display_secs = 1
"#,
            base_url
        ),
    )
    .unwrap();
    (tmp, config_path)
}

/// Run the binary off the async runtime so the mock keeps serving.
async fn run_ragchat(config_path: &Path, args: &[&str], stdin: Option<&str>) -> (String, String, bool) {
    let binary = ragchat_binary();
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let stdin = stdin.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let mut child = Command::new(&binary)
            .arg("--config")
            .arg(&config_path)
            .args(&args)
            .env_remove("RAGCHAT_BACKEND_URL")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap_or_else(|e| panic!("Failed to run ragchat binary at {:?}: {}", binary, e));
        {
            let mut pipe = child.stdin.take().unwrap();
            if let Some(input) = stdin {
                pipe.write_all(input.as_bytes()).unwrap();
            }
        }
        let output = child.wait_with_output().unwrap();
        (
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            output.status.success(),
        )
    })
    .await
    .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(ragchat_binary()).arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for cmd in ["chat", "ask", "ingest", "stats", "health", "completions"] {
        assert!(stdout.contains(cmd), "missing {} in help:\n{}", cmd, stdout);
    }
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = write_config("ftp://nowhere");
    let output = Command::new(ragchat_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("health")
        .env_remove("RAGCHAT_BACKEND_URL")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("base_url"));
}

#[test]
fn test_completions_need_no_config() {
    let output = Command::new(ragchat_binary())
        .args(["--config", "/does/not/exist.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ragchat"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health() {
    let (url, _mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let (stdout, stderr, success) = run_ragchat(&config_path, &["health"], None).await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("ok (version test)"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ask_json_with_filter() {
    let (url, mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let (stdout, stderr, success) = run_ragchat(
        &config_path,
        &["ask", "What is X?", "--filter", "author=Alice", "--json"],
        None,
    )
    .await;
    assert!(success, "stderr: {}", stderr);

    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["answer"], "You asked: What is X?");
    assert_eq!(v["namespace"], "default");
    assert!(v["session_id"].as_str().unwrap().starts_with("session-"));
    assert_eq!(v["sources"].as_array().unwrap().len(), 2);
    assert_eq!(mock.recorded().chats[0]["metadata_filters"]["author"], "Alice");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ask_unknown_filter_rejected() {
    let (url, mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let (_, stderr, success) =
        run_ragchat(&config_path, &["ask", "q", "--filter", "genre=poetry"], None).await;
    assert!(!success);
    assert!(stderr.contains("genre=poetry"));
    assert!(mock.recorded().chats.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ask_failure_prints_fallback() {
    let (url, _mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let (stdout, stderr, success) = run_ragchat(&config_path, &["ask", "boom"], None).await;
    assert!(!success);
    assert!(stdout.contains("Sorry, I encountered an error."));
    assert!(stderr.contains("LLM unavailable"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ingest_text_with_meta() {
    let (url, mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let (stdout, stderr, success) = run_ragchat(
        &config_path,
        &["--namespace", "notes", "ingest", "--text", "hello", "--meta", "author=Alice"],
        None,
    )
    .await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("Document ingested successfully."));
    assert_eq!(
        mock.recorded().ingests[0],
        serde_json::json!({
            "text": "hello",
            "metadata": {"source": "user-upload", "author": "Alice"},
            "namespace": "notes"
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ingest_file() {
    let (url, mock) = common::spawn_mock().await;
    let (tmp, config_path) = write_config(&url);
    let doc = tmp.path().join("notes.md");
    fs::write(&doc, "# Notes\n\nSome text.").unwrap();

    let (stdout, stderr, success) = run_ragchat(
        &config_path,
        &["ingest", "--file", doc.to_str().unwrap()],
        None,
    )
    .await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("File: notes.md"));
    let uploads = mock.recorded().file_uploads;
    let file = uploads[0].iter().find(|f| f.name == "file").unwrap();
    assert_eq!(file.bytes, b"# Notes\n\nSome text.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stats() {
    let (url, mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let (stdout, stderr, success) =
        run_ragchat(&config_path, &["--namespace", "legal", "stats"], None).await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("Metadata for namespace 'legal'"));
    assert!(stdout.contains("author  2 value(s): Alice, Bob"));
    assert!(stdout.contains("year    2 value(s): 2023, 2024"));
    assert_eq!(mock.recorded().stats_queries, vec!["legal".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chat_repl_with_piped_input() {
    let (url, mock) = common::spawn_mock().await;
    let (_tmp, config_path) = write_config(&url);
    let script = "/ns\n/filter author Alice\nWhat is X?\n/paste\nline one\n.\n/meta add year 2024\n/quit\n";
    let (stdout, stderr, success) =
        run_ragchat(&config_path, &["chat"], Some(script)).await;
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("Namespace: default"));
    assert!(stdout.contains("bot> You asked: What is X?"));
    assert!(stdout.contains("Document loaded (9 chars)"));
    assert!(stdout.contains("1: year = 2024"));
    assert_eq!(mock.recorded().chats.len(), 1);
}
