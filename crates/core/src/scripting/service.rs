//! Script execution entry points used by the transport layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ScriptsConfig, SCRIPT_EXTENSION};
use crate::error::{CoreError, CoreResult};

use super::executor::{ExecutionRequest, ExecutionResult, OutputFormat};
use super::format::{format_stream, ChunkStream};
use super::permissions::{ensure_executable, is_executable};
use super::resolver::{PathResolver, ResolvedScript};
use super::shell::ShellCommand;
use super::subprocess::{run_collect, stream_lines};

/// Exit status the shell uses for a script file it cannot find.
const SHELL_NOT_FOUND_EXIT: i32 = 127;

/// Result of [`ExecutionService::execute`].
pub enum Execution {
    Completed(ExecutionResult),
    Streaming(ChunkStream),
}

/// A script file currently present in the target directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedScript {
    pub name: String,
    pub path: PathBuf,
    pub executable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptListing {
    pub target_dir: PathBuf,
    pub allowed_keys: Vec<String>,
    pub found: Vec<ListedScript>,
}

/// Resolves, prepares and runs allow-listed scripts.
///
/// Stateless between calls; concurrent runs spawn unrelated processes.
#[derive(Debug, Clone)]
pub struct ExecutionService {
    config: Arc<ScriptsConfig>,
    resolver: PathResolver,
}

impl ExecutionService {
    pub fn new(config: Arc<ScriptsConfig>) -> Self {
        Self {
            resolver: PathResolver::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn config(&self) -> &ScriptsConfig {
        &self.config
    }

    /// Dispatch on `request.stream`.
    pub async fn execute(&self, request: ExecutionRequest) -> CoreResult<Execution> {
        if request.stream {
            self.run_streaming(&request.key, request.args, request.format)
                .await
                .map(Execution::Streaming)
        } else {
            self.run_blocking(&request.key, request.args, request.include_source)
                .await
                .map(Execution::Completed)
        }
    }

    /// Run `key` to completion and return its separated output.
    ///
    /// A non-zero exit code is part of the returned result, not an error.
    pub async fn run_blocking(
        &self,
        key: &str,
        args: Vec<String>,
        include_source: bool,
    ) -> CoreResult<ExecutionResult> {
        let script = self.prepare(key).await?;
        let command = ShellCommand::for_script(&self.config, &script.path, &args);

        tracing::info!(key, path = %script.path.display(), args = ?args, "Running script");
        let output = run_collect(&command, self.config.run_timeout).await?;

        // The shell reports a script that vanished before it could be opened
        // (a concurrent sync replacing the directory) as exit 127.
        if output.exit_code == SHELL_NOT_FOUND_EXIT
            && matches!(
                tokio::fs::metadata(&script.path).await,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound
            )
        {
            tracing::warn!(key, path = %script.path.display(), "Script disappeared before it ran");
            return Err(CoreError::ScriptMissing {
                key: script.key,
                path: script.path,
            });
        }

        if output.exit_code == 0 {
            tracing::info!(key, duration_ms = output.duration_ms, "Script succeeded");
        } else {
            tracing::warn!(
                key,
                exit_code = output.exit_code,
                duration_ms = output.duration_ms,
                "Script exited with non-zero status"
            );
        }

        let source = if include_source {
            Some(read_source(&script.path).await)
        } else {
            None
        };

        Ok(ExecutionResult {
            script: script.key,
            path: script.path,
            args,
            returncode: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            duration_ms: output.duration_ms,
            source,
        })
    }

    /// Start `key` and return its merged output framed as `format`.
    ///
    /// Resolution and spawn errors are returned before any chunk is produced.
    pub async fn run_streaming(
        &self,
        key: &str,
        args: Vec<String>,
        format: OutputFormat,
    ) -> CoreResult<ChunkStream> {
        let script = self.prepare(key).await?;
        let command = ShellCommand::for_script(&self.config, &script.path, &args);

        tracing::info!(key, path = %script.path.display(), args = ?args, %format, "Streaming script");
        let events = stream_lines(&command)?;
        Ok(format_stream(events, format))
    }

    /// Allow-listed keys plus every script file currently on disk.
    pub async fn list_scripts(&self) -> CoreResult<ScriptListing> {
        let target_dir = self.config.target_dir().to_path_buf();
        let found = list_script_files(&target_dir).await?;
        Ok(ScriptListing {
            target_dir,
            allowed_keys: self.config.allowed_keys(),
            found,
        })
    }

    /// Resolve and add execute bits right before spawning.
    async fn prepare(&self, key: &str) -> CoreResult<ResolvedScript> {
        let mut script = self.resolver.resolve(key).await?;
        match ensure_executable(&script.path).await {
            Ok(_) => {
                script.is_executable = true;
                Ok(script)
            }
            // Replaced by a concurrent sync between the check and the chmod.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::ScriptMissing {
                key: script.key,
                path: script.path,
            }),
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}

async fn read_source(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read script source");
            format!("<unable to read script source: {e}>")
        }
    }
}

async fn list_script_files(dir: &Path) -> CoreResult<Vec<ListedScript>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        found.push(ListedScript {
            name: entry.file_name().to_string_lossy().into_owned(),
            executable: is_executable(&metadata),
            path,
        });
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}
