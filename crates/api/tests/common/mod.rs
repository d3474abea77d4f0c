#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use scriptgate_api::config::ServerConfig;
use scriptgate_api::router::build_app_router;
use scriptgate_api::state::AppState;
use scriptgate_core::config::{ScriptEntry, ScriptsConfig};

/// Keys allow-listed by [`test_config`].
pub const TEST_KEYS: [&str; 4] = ["hello", "fail", "lines", "absent"];

/// Build a test `ServerConfig` rooted at `target_dir`.
///
/// Line buffering is disabled so tests do not depend on `stdbuf`, and the
/// ownership step is skipped.
pub fn test_config(target_dir: &Path) -> ServerConfig {
    let entries = TEST_KEYS
        .iter()
        .map(|k| ScriptEntry::new(*k, format!("{k}.sh")))
        .collect();
    let mut scripts = ScriptsConfig::new(target_dir, entries).unwrap();
    scripts.line_buffer.clear();
    scripts.repo.owner = None;
    scripts.repo.staging_dir = target_dir.with_extension("staging");

    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        scripts: Arc::new(scripts),
    }
}

/// Build the full application router with all middleware layers.
///
/// Same builder as `main.rs`, so tests exercise the production middleware
/// stack (CORS, request ID, timeout, tracing, panic recovery).
pub fn build_test_app(config: ServerConfig) -> Router {
    let state = AppState::new(config.clone());
    build_app_router(state, &config)
}

/// Scripts directory inside `root`, with the standard test scripts.
///
/// Scripts are written without execute bits.
pub fn scripts_dir(root: &Path) -> PathBuf {
    let dir = root.join("scripts");
    std::fs::create_dir_all(&dir).unwrap();
    write_script(&dir, "hello.sh", "echo \"hello $*\"\necho note >&2\n");
    write_script(&dir, "fail.sh", "echo partial\necho boom >&2\nexit 7\n");
    write_script(&dir, "lines.sh", "for i in 1 2 3; do echo \"line $i\"; done\n");
    dir
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/bash\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    path
}

pub async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn post(app: Router, uri: &str) -> Response {
    send(app, Method::POST, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Local repository on `main` holding `scripts/hello.sh`. Returns a
/// `file://` URL.
pub fn make_remote(root: &Path) -> String {
    let repo = root.join("remote");
    std::fs::create_dir_all(repo.join("scripts")).unwrap();
    write_script(&repo.join("scripts"), "hello.sh", "echo \"synced $*\"\n");
    std::fs::write(repo.join("README.md"), "readme\n").unwrap();

    for args in [
        vec!["init", "-q"],
        vec!["symbolic-ref", "HEAD", "refs/heads/main"],
        vec!["add", "."],
        vec!["commit", "-q", "-m", "init"],
    ] {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=scriptgate", "-c", "user.email=scriptgate@localhost"])
            .args(&args)
            .current_dir(&repo)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    format!("file://{}", repo.display())
}
