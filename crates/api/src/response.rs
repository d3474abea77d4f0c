//! Shared response envelope for JSON handlers.
//!
//! Successful JSON responses use a `{ "data": ... }` envelope. Errors use
//! `{ "error", "code" [, "details"] }` (see [`crate::error::AppError`]).

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: listing }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
