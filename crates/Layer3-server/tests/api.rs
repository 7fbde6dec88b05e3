//! Router-level tests: real handlers, scratch root, no network

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use desk_foundation::DeskConfig;
use desk_server::{build_router, AppState};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn setup() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/readme.txt"), "hello").unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>desk</html>").unwrap();

    let config = DeskConfig {
        root_dir: dir.path().to_path_buf(),
        max_upload_bytes: 1024,
        chat_history_dir: Some(dir.path().join(".chat")),
        ..DeskConfig::default()
    };
    let state = AppState::from_config(config).unwrap();
    (dir, build_router(state))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

fn multipart(fields: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "desk-test-boundary";
    let mut body = Vec::new();
    for (name, filename, data) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

async fn post_multipart(
    app: &Router,
    uri: &str,
    fields: &[(&str, Option<&str>, &[u8])],
) -> (StatusCode, Value) {
    let (content_type, body) = multipart(fields);
    let request = Request::post(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

async fn wait_for_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = get(app, &format!("/api/job-status/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "running" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} never finished");
}

// ============================================================================
// Jobs
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_submit_and_poll_echo() {
    let (_dir, app) = setup();

    let (status, body) = post(&app, "/api/submit-command", json!({ "command": "echo hello" })).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let body = wait_for_terminal(&app, &job_id).await;
    assert_eq!(body["status"], "finished");
    assert_eq!(body["return_code"], 0);
    assert!(body["output"].as_str().unwrap().contains("hello"));

    // Handed out once
    let (status, body) = get(&app, &format!("/api/job-status/{}", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unknown job ID");
}

#[cfg(unix)]
#[tokio::test]
async fn test_alias_routes() {
    let (_dir, app) = setup();

    let (status, body) = post(&app, "/api/execute-command", json!({ "command": "echo alias" })).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let mut finished = Value::Null;
    for _ in 0..200 {
        let (_, body) = get(&app, &format!("/api/command-status/{}", job_id)).await;
        if body["status"] != "running" {
            finished = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(finished["returncode"], 0);

    let (status, body) = get(&app, "/api/list-scripts").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["processes"].is_array());
}

#[tokio::test]
async fn test_rejections_are_400_with_stable_messages() {
    let (_dir, app) = setup();

    let cases = [
        ("rm -rf /", "Command not permitted"),
        ("echo hi && rm -rf /", "Command contains unsupported operators"),
        ("echo `id`", "Command contains unsupported operators"),
        ("   ", "Empty command"),
    ];
    for (command, message) in cases {
        let (status, body) = post(&app, "/api/submit-command", json!({ "command": command })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{command:?}");
        assert_eq!(body["error"], message, "{command:?}");
    }

    let long = format!("echo {}", "a".repeat(2000));
    let (status, body) = post(&app, "/api/submit-command", json!({ "command": long })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Command too long");

    let (_, body) = get(&app, "/api/list-jobs").await;
    assert_eq!(body["processes"], json!([]));
}

#[tokio::test]
async fn test_malformed_json_is_400_json() {
    let (_dir, app) = setup();

    let bodies = [
        ("application/json", "{\"command\": "),
        ("application/json", "{\"command\": 42}"),
        ("text/plain", "{\"command\": \"echo hi\"}"),
    ];
    for (content_type, raw) in bodies {
        let request = Request::post("/api/submit-command")
            .header("content-type", content_type)
            .body(Body::from(raw))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{raw:?}");
        assert_eq!(body["ok"], false, "{raw:?}");
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"), "{raw:?}");
    }
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let (_dir, app) = setup();

    for id in ["not-a-uuid", "6f1c1f0e-0000-4000-8000-000000000000"] {
        let (status, body) = get(&app, &format!("/api/job-status/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown job ID");
    }
}

#[tokio::test]
async fn test_missing_script_is_404() {
    let (_dir, app) = setup();
    let (status, body) = post(&app, "/api/submit-script", json!({ "script_name": "nope.sh" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Script not found");
}

#[tokio::test]
async fn test_stop_requires_target() {
    let (_dir, app) = setup();

    let (status, _) = post(&app, "/api/stop-job", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/stop-job", json!({ "pid": 999_999 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_and_stop_script() {
    let (dir, app) = setup();
    std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
    std::fs::write(dir.path().join("scripts/wait.sh"), "sleep 30\n").unwrap();

    let (status, body) = post(&app, "/api/run-script", json!({ "script": "wait.sh" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["script"], "wait.sh");
    let pid = body["pid"].as_u64().unwrap();

    let (_, listed) = get(&app, "/api/list-jobs").await;
    assert!(listed["processes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["pid"] == pid && p["script"] == "wait.sh"));

    let (status, body) = post(&app, "/api/stop-script", json!({ "pid": pid })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], pid);

    let (_, listed) = get(&app, "/api/list-jobs").await;
    assert!(!listed["processes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["pid"] == pid));
}

// ============================================================================
// File manager
// ============================================================================

#[tokio::test]
async fn test_list_directory() {
    let (_dir, app) = setup();

    let (status, body) = get(&app, "/api/list-directory?path=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items[0]["name"], "docs");
    assert_eq!(items[0]["isDir"], true);

    let (status, body) = get(&app, "/api/list-directory?path=docs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["path"], "docs/readme.txt");
    assert_eq!(body["items"][0]["size"], 5);
}

#[tokio::test]
async fn test_traversal_is_invalid_path() {
    let (_dir, app) = setup();

    for path in ["..", "../etc", "docs/../..", "..%5C..", "%2Fetc"] {
        let (status, body) = get(&app, &format!("/api/list-directory?path={}", path)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path:?}");
        assert_eq!(body["error"], "Invalid path", "{path:?}");
    }

    let (status, body) = post(&app, "/api/delete", json!({ "path": "../outside" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid path");

    let (status, _) = post(&app, "/api/create-folder", json!({ "path": "", "name": "../x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_root_cannot_be_deleted_or_renamed() {
    let (dir, app) = setup();

    let (status, body) = post(&app, "/api/delete", json!({ "path": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid path");

    let (status, _) = post(&app, "/api/rename", json!({ "path": ".", "new_name": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(dir.path().join("docs").exists());
}

#[tokio::test]
async fn test_create_rename_delete() {
    let (dir, app) = setup();

    let (status, body) = post(&app, "/api/create-folder", json!({ "path": "docs", "name": "new" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "docs/new");
    assert!(dir.path().join("docs/new").is_dir());

    let (status, _) = post(&app, "/api/create-folder", json!({ "path": "docs", "name": "new" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post(&app, "/api/rename", json!({ "path": "docs/new", "new_name": "renamed" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "docs/renamed");
    assert!(dir.path().join("docs/renamed").is_dir());

    let (status, body) = post(&app, "/api/delete", json!({ "path": "docs" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(!dir.path().join("docs").exists());

    let (status, _) = post(&app, "/api/delete", json!({ "path": "docs" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload() {
    let (dir, app) = setup();

    let (status, body) = post_multipart(
        &app,
        "/api/upload",
        &[("path", None, b"docs"), ("file", Some("note.txt"), b"uploaded")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "docs/note.txt");
    assert_eq!(std::fs::read_to_string(dir.path().join("docs/note.txt")).unwrap(), "uploaded");

    let (status, body) = post_multipart(
        &app,
        "/api/upload",
        &[("path", None, b"../"), ("file", Some("note.txt"), b"x")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid path");
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_through_dangling_link_is_invalid_path() {
    let (dir, app) = setup();
    let outside = TempDir::new().unwrap();
    let target = outside.path().join("planted.txt");
    std::os::unix::fs::symlink(&target, dir.path().join("docs/planted.txt")).unwrap();

    let (status, body) = post_multipart(
        &app,
        "/api/upload",
        &[("path", None, b"docs"), ("file", Some("planted.txt"), b"payload")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid path");
    assert!(!target.exists());
}

#[tokio::test]
async fn test_upload_over_cap_is_413() {
    let (_dir, app) = setup();
    let big = vec![b'x'; 2048];
    let (status, _) = post_multipart(
        &app,
        "/api/upload",
        &[("path", None, b""), ("file", Some("big.bin"), &big)],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// System
// ============================================================================

#[tokio::test]
async fn test_status() {
    let (_dir, app) = setup();
    let (status, body) = get(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_system_stats() {
    let (_dir, app) = setup();
    let (status, body) = get(&app, "/api/system-stats").await;
    assert_eq!(status, StatusCode::OK);
    for key in ["cpu", "ram"] {
        let value = body[key].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&value), "{key} = {value}");
    }
}

#[tokio::test]
async fn test_icons() {
    let (dir, app) = setup();

    let (_, body) = get(&app, "/api/list-icons").await;
    assert_eq!(body["icons"], json!([]));

    let png = b"\x89PNG\r\n\x1a\nrest";
    let (status, body) = post_multipart(&app, "/api/upload-icon", &[("file", Some("app.png"), png)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file"], "app.png");
    assert!(dir.path().join("icons/app.png").is_file());

    let (status, _) = post_multipart(&app, "/api/upload-icon", &[("file", Some("fake.png"), b"GIF89a")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get(&app, "/api/list-icons").await;
    assert_eq!(body["icons"], json!(["app.png"]));
}

#[tokio::test]
async fn test_log_client_error() {
    let (_dir, app) = setup();
    let (status, body) = post(
        &app,
        "/api/log-client-error",
        json!({ "app": "notepad", "message": "boom", "stack": "at x" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

// ============================================================================
// Ollama
// ============================================================================

#[tokio::test]
async fn test_chat_history() {
    let (dir, app) = setup();

    let (status, body) = get(&app, "/api/ollama/history/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"], json!([]));

    let saved = json!({ "history": [
        { "role": "user", "content": "hi" },
        { "role": "assistant", "content": "hello" },
    ]});
    std::fs::create_dir_all(dir.path().join(".chat")).unwrap();
    std::fs::write(dir.path().join(".chat/alice.json"), saved.to_string()).unwrap();

    let (status, body) = get(&app, "/api/ollama/history/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"][1]["content"], "hello");

    let (status, body) = get(&app, "/api/ollama/history/%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid profile");
}

#[tokio::test]
async fn test_chat_requires_model() {
    let (_dir, app) = setup();
    let (status, body) = post(&app, "/api/ollama/chat", json!({ "model": "", "prompt": "hi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Model is required");
}

#[tokio::test]
async fn test_static_index() {
    let (_dir, app) = setup();
    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<html>desk</html>");
}
