//! Allow-list lookup.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::ScriptsConfig;
use crate::error::{CoreError, CoreResult};

use super::permissions::is_executable;

/// A key resolved against the filesystem at request time. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedScript {
    pub key: String,
    pub path: PathBuf,
    pub is_executable: bool,
}

/// Maps allow-listed keys to script files under the target directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    config: Arc<ScriptsConfig>,
}

impl PathResolver {
    pub fn new(config: Arc<ScriptsConfig>) -> Self {
        Self { config }
    }

    /// Resolve `key` to an existing regular file.
    ///
    /// Does not modify permissions.
    pub async fn resolve(&self, key: &str) -> CoreResult<ResolvedScript> {
        let entry = self
            .config
            .entry(key)
            .ok_or_else(|| CoreError::UnknownScript(key.to_string()))?;

        let path = self.config.target_dir().join(&entry.filename);
        let missing = || CoreError::ScriptMissing {
            key: key.to_string(),
            path: path.clone(),
        };

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(ResolvedScript {
                key: key.to_string(),
                is_executable: is_executable(&metadata),
                path,
            }),
            Ok(_) => Err(missing()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(missing()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}
