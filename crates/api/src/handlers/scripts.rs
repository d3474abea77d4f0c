//! Handlers for listing, syncing and running allow-listed scripts.

use std::convert::Infallible;
use std::path::PathBuf;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use scriptgate_core::scripting::executor::{ExecutionRequest, ExecutionResult, OutputFormat};
use scriptgate_core::scripting::service::{Execution, ScriptListing};
use scriptgate_core::sync::SyncOutcome;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /scripts/clone`. Every field is optional and an
/// empty body is accepted.
#[derive(Debug, Default, Deserialize)]
pub struct CloneRequest {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub clean: Option<bool>,
}

/// Payload of `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceIndex {
    pub message: &'static str,
    pub endpoints: Value,
    pub scripts: Vec<String>,
    pub shortcuts: Vec<String>,
    pub target_dir: PathBuf,
}

/// Raw query pairs, kept in order so `args` may repeat.
pub type QueryPairs = Vec<(String, String)>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /
pub async fn index(State(state): State<AppState>) -> Json<DataResponse<ServiceIndex>> {
    let config = state.scripts.config();
    let keys = config.allowed_keys();
    let shortcuts = keys.iter().map(|k| format!("/scripts/run/{k}")).collect();

    Json(DataResponse {
        data: ServiceIndex {
            message: "Scripts API ready",
            endpoints: json!({
                "clone": "POST /scripts/clone",
                "list": "GET /scripts/list",
                "run": "POST /scripts/run/{key}?args=...&include_source=false",
                "stream": "GET|POST /scripts/stream/{key}?args=...&format=plain|jsonl|sse",
            }),
            scripts: keys,
            shortcuts,
            target_dir: config.target_dir().to_path_buf(),
        },
    })
}

/// GET /scripts/list
pub async fn list_scripts(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ScriptListing>>> {
    let listing = state.scripts.list_scripts().await?;
    Ok(Json(DataResponse { data: listing }))
}

/// POST /scripts/clone
///
/// Sparse-fetch the scripts directory and replace (or merge into) the
/// target directory.
pub async fn clone_scripts(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DataResponse<SyncOutcome>>> {
    let input: CloneRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CloneRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid clone request body: {e}")))?
    };

    let spec = state.sync.spec(input.repo_url, input.branch, input.clean);
    let outcome = state.sync.sync(&spec).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /scripts/run/{key}
///
/// Query: `args` (repeatable), `include_source`. A non-zero exit is
/// returned as `NON_ZERO_EXIT` with the full result in `details`.
pub async fn run_script(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(pairs): Query<QueryPairs>,
) -> AppResult<Json<DataResponse<ExecutionResult>>> {
    let request = blocking_request(key, &pairs)?;
    run_blocking(&state, request).await
}

/// POST /scripts/run/<key> for a fixed allow-listed key.
///
/// Same query handling as [`run_script`].
pub async fn run_shortcut(
    State(state): State<AppState>,
    key: String,
    Query(pairs): Query<QueryPairs>,
) -> AppResult<Json<DataResponse<ExecutionResult>>> {
    let request = blocking_request(key, &pairs)?;
    run_blocking(&state, request).await
}

/// GET|POST /scripts/stream/{key}
///
/// Query: `args` (repeatable), `format` (`plain`, `jsonl`, `sse`).
/// Resolution and spawn errors are reported as JSON before any output.
pub async fn stream_script(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(pairs): Query<QueryPairs>,
) -> AppResult<Response> {
    let request = streaming_request(key, &pairs)?;
    let format = request.format;

    let Execution::Streaming(chunks) = state.scripts.execute(request).await? else {
        return Err(AppError::InternalError(
            "streaming request completed without a stream".to_string(),
        ));
    };

    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));

    Response::builder()
        .header(CONTENT_TYPE, format.content_type())
        .header(CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| AppError::InternalError(format!("Failed to build response: {e}")))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn run_blocking(
    state: &AppState,
    request: ExecutionRequest,
) -> AppResult<Json<DataResponse<ExecutionResult>>> {
    let Execution::Completed(result) = state.scripts.execute(request).await? else {
        return Err(AppError::InternalError(
            "blocking request produced a stream".to_string(),
        ));
    };

    if !result.is_success() {
        return Err(AppError::NonZeroExit(Box::new(result)));
    }
    Ok(Json(DataResponse { data: result }))
}

fn blocking_request(key: String, pairs: &QueryPairs) -> AppResult<ExecutionRequest> {
    let mut request = ExecutionRequest::blocking(key, collect_args(pairs));
    if let Some(raw) = last_value(pairs, "include_source") {
        request.include_source = parse_bool(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid include_source: {raw}")))?;
    }
    Ok(request)
}

fn streaming_request(key: String, pairs: &QueryPairs) -> AppResult<ExecutionRequest> {
    let format = match last_value(pairs, "format") {
        Some(raw) => raw.parse::<OutputFormat>().map_err(AppError::BadRequest)?,
        None => OutputFormat::default(),
    };
    Ok(ExecutionRequest::streaming(key, collect_args(pairs), format))
}

fn collect_args(pairs: &QueryPairs) -> Vec<String> {
    pairs
        .iter()
        .filter(|(name, _)| name == "args")
        .map(|(_, value)| value.clone())
        .collect()
}

fn last_value<'a>(pairs: &'a QueryPairs, name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
