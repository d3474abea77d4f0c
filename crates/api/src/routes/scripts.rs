//! Route definitions for script listing, sync and execution.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::scripts::{self, QueryPairs};
use crate::state::AppState;

/// Routes mounted at `/scripts`.
///
/// ```text
/// GET       /list               -> list_scripts
/// POST      /clone              -> clone_scripts
/// POST      /run/{key}          -> run_script
/// GET|POST  /stream/{key}       -> stream_script
/// POST      /run/<key>          -> run_shortcut (one per allow-listed key)
/// ```
///
/// Static shortcut paths take precedence over `/run/{key}`, so a shortcut
/// must accept the same query parameters as the generic route.
pub fn router(keys: &[String]) -> Router<AppState> {
    let mut router = Router::new()
        .route("/list", get(scripts::list_scripts))
        .route("/clone", post(scripts::clone_scripts))
        .route("/run/{key}", post(scripts::run_script))
        .route(
            "/stream/{key}",
            get(scripts::stream_script).post(scripts::stream_script),
        );

    for key in keys {
        let key = key.clone();
        router = router.route(
            &format!("/run/{key}"),
            post(move |state: State<AppState>, query: Query<QueryPairs>| {
                scripts::run_shortcut(state, key, query)
            }),
        );
    }
    router
}
