pub mod health;
pub mod scripts;

use axum::routing::get;
use axum::Router;
use scriptgate_core::config::ScriptsConfig;

use crate::handlers;
use crate::state::AppState;

/// Build the service route tree.
///
/// Route hierarchy:
///
/// ```text
/// /                                   service index (GET)
///
/// /scripts/list                       allow-list and scripts on disk (GET)
/// /scripts/clone                      sync from the repository (POST)
/// /scripts/run/{key}                  blocking run (POST)
/// /scripts/stream/{key}               streaming run (GET, POST)
/// /scripts/run/<allowed key>          no-argument shortcut per key (POST)
/// ```
///
/// Shortcut routes are fixed at startup from the allow-list.
pub fn api_routes(scripts: &ScriptsConfig) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::scripts::index))
        .nest("/scripts", scripts::router(&scripts.allowed_keys()))
}
