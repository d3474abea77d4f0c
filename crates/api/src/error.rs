use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scriptgate_core::error::CoreError;
use scriptgate_core::scripting::executor::ExecutionResult;
use serde_json::{json, Value};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `scriptgate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The script ran and reported failure. Carries the full result.
    #[error("Script exited with code {}", .0.returncode)]
    NonZeroExit(Box<ExecutionResult>),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Script reported failure ---
            AppError::NonZeroExit(result) => {
                let message = format!(
                    "Script '{}' exited with code {}",
                    result.script, result.returncode
                );
                let details = serde_json::to_value(&*result).ok();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "NON_ZERO_EXIT",
                    message,
                    details,
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}

type Classified = (StatusCode, &'static str, String, Option<Value>);

fn classify_core_error(err: CoreError) -> Classified {
    let message = err.to_string();
    match err {
        CoreError::UnknownScript(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_SCRIPT", message, None),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
        CoreError::ScriptMissing { .. } => {
            (StatusCode::NOT_FOUND, "SCRIPT_MISSING", message, None)
        }
        CoreError::SpawnFailed { .. } => {
            tracing::error!(error = %message, "Script spawn failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "SPAWN_FAILED", message, None)
        }
        CoreError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "SCRIPT_TIMEOUT", message, None),
        CoreError::VcsStepFailed {
            step,
            stdout,
            stderr,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "SYNC_STEP_FAILED",
            format!("git {step} failed"),
            Some(json!({
                "step": step,
                "stdout": stdout,
                "stderr": stderr,
            })),
        ),
        CoreError::SparseCheckoutEmpty { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "SPARSE_CHECKOUT_EMPTY",
            message,
            None,
        ),
        CoreError::Io(e) => {
            tracing::error!(error = %e, "I/O error");
            internal()
        }
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
        None,
    )
}
