use std::sync::Arc;

use scriptgate_core::scripting::service::ExecutionService;
use scriptgate_core::sync::RepositorySync;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is an `Arc` or wraps one.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Blocking and streaming script runs.
    pub scripts: ExecutionService,
    /// Repository sync into the target directory.
    pub sync: RepositorySync,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let scripts_config = Arc::clone(&config.scripts);
        Self {
            scripts: ExecutionService::new(Arc::clone(&scripts_config)),
            sync: RepositorySync::new(scripts_config),
            config: Arc::new(config),
        }
    }
}
