//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use scriptgate_api::error::AppError;
use scriptgate_core::error::{CoreError, SyncStep};
use scriptgate_core::scripting::executor::ExecutionResult;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn unknown_script_returns_400() {
    let err = AppError::Core(CoreError::UnknownScript("nope".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "UNKNOWN_SCRIPT");
    assert_eq!(json["error"], "Unknown script key 'nope'");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn script_missing_returns_404() {
    let err = AppError::Core(CoreError::ScriptMissing {
        key: "os_flashing".into(),
        path: PathBuf::from("/home/rpi/scripts/os_flashing.sh"),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SCRIPT_MISSING");
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("bad key".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "bad key");
}

#[tokio::test]
async fn spawn_failure_returns_500() {
    let err = AppError::Core(CoreError::SpawnFailed {
        program: "/bin/nope".into(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "SPAWN_FAILED");
}

#[tokio::test]
async fn timeout_returns_504() {
    let err = AppError::Core(CoreError::Timeout { elapsed_ms: 1500 });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["code"], "SCRIPT_TIMEOUT");
}

#[tokio::test]
async fn sync_step_failure_carries_diagnostics() {
    let err = AppError::Core(CoreError::VcsStepFailed {
        step: SyncStep::SparseSet,
        stdout: "out".into(),
        stderr: "fatal: bad pattern".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "SYNC_STEP_FAILED");
    assert_eq!(json["error"], "git sparse_set failed");
    assert_eq!(json["details"]["step"], "sparse_set");
    assert_eq!(json["details"]["stdout"], "out");
    assert_eq!(json["details"]["stderr"], "fatal: bad pattern");
}

#[tokio::test]
async fn sparse_checkout_empty_is_distinct() {
    let err = AppError::Core(CoreError::SparseCheckoutEmpty {
        subdir: "scripts".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "SPARSE_CHECKOUT_EMPTY");
    assert!(json["error"].as_str().unwrap().contains("'scripts'"));
}

#[tokio::test]
async fn non_zero_exit_returns_full_result() {
    let result = ExecutionResult {
        script: "os_flashing".into(),
        path: PathBuf::from("/home/rpi/scripts/os_flashing.sh"),
        args: vec!["--dry-run".into()],
        returncode: 3,
        stdout: "flashing\n".into(),
        stderr: "device busy\n".into(),
        duration_ms: 12,
        source: None,
    };
    let err = AppError::NonZeroExit(Box::new(result));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "NON_ZERO_EXIT");
    assert_eq!(json["error"], "Script 'os_flashing' exited with code 3");
    assert_eq!(json["details"]["returncode"], 3);
    assert_eq!(json["details"]["stdout"], "flashing\n");
    assert_eq!(json["details"]["stderr"], "device busy\n");
    assert_eq!(json["details"]["args"][0], "--dry-run");
}

#[tokio::test]
async fn io_error_is_sanitized() {
    let err = AppError::Core(CoreError::Io(std::io::Error::other(
        "/secret/path permission denied",
    )));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("invalid field value".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "invalid field value");
}
