//! Immutable runtime configuration for script execution and repository sync.
//!
//! Built once at startup (see `scriptgate_api::config`) and shared behind an
//! `Arc`. Nothing here is read from ambient process state after
//! construction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Extension (without the dot) of files treated as scripts.
pub const SCRIPT_EXTENSION: &str = "sh";

/// Default interpreter for scripts.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Default wrapper forcing line-buffered stdout/stderr on the child.
pub const DEFAULT_LINE_BUFFER: [&str; 3] = ["stdbuf", "-oL", "-eL"];

/// One allow-listed script: an opaque key mapped to a file in the target dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    pub key: String,
    pub filename: String,
}

impl ScriptEntry {
    pub fn new(key: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            filename: filename.into(),
        }
    }
}

/// Where and how [`crate::sync::RepositorySync`] fetches scripts.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Remote used when a sync request does not name one.
    pub default_repo_url: String,
    /// Branch used when a sync request does not name one.
    pub default_branch: String,
    /// Subdirectory of the repository that holds the scripts.
    pub subdir: String,
    /// Scratch checkout location, wiped at the start of every sync.
    pub staging_dir: PathBuf,
    /// Account that should own the synced scripts (`chown user:user`).
    /// `None` skips the ownership step.
    pub owner: Option<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_repo_url: "https://github.com/Rutomatrix/Intel-features".to_string(),
            default_branch: "main".to_string(),
            subdir: "scripts".to_string(),
            staging_dir: std::env::temp_dir().join("scripts_sparse_clone"),
            owner: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptsConfig {
    target_dir: PathBuf,
    scripts: Vec<ScriptEntry>,
    /// Interpreter that runs every script file.
    pub shell: PathBuf,
    /// Privilege-elevation prefix, e.g. `["sudo", "-n"]`. Empty for none.
    pub elevation: Vec<String>,
    /// Line-buffering wrapper placed before the shell. Empty for none.
    pub line_buffer: Vec<String>,
    /// Wall-clock limit for blocking runs.
    pub run_timeout: Option<Duration>,
    pub repo: RepoConfig,
}

impl ScriptsConfig {
    /// Build a config for `target_dir` with the given allow-list.
    ///
    /// Fails if the allow-list is empty, holds duplicate keys, or names
    /// anything other than a bare file inside the target directory.
    pub fn new(target_dir: impl Into<PathBuf>, scripts: Vec<ScriptEntry>) -> CoreResult<Self> {
        validate_allow_list(&scripts)?;
        Ok(Self {
            target_dir: target_dir.into(),
            scripts,
            shell: PathBuf::from(DEFAULT_SHELL),
            elevation: Vec::new(),
            line_buffer: DEFAULT_LINE_BUFFER.iter().map(|s| s.to_string()).collect(),
            run_timeout: None,
            repo: RepoConfig::default(),
        })
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Allow-list entries, in configuration order.
    pub fn scripts(&self) -> &[ScriptEntry] {
        &self.scripts
    }

    pub fn allowed_keys(&self) -> Vec<String> {
        self.scripts.iter().map(|s| s.key.clone()).collect()
    }

    pub fn entry(&self, key: &str) -> Option<&ScriptEntry> {
        self.scripts.iter().find(|s| s.key == key)
    }
}

/// Parse a `key=filename,key=filename` allow-list.
pub fn parse_allow_list(raw: &str) -> CoreResult<Vec<ScriptEntry>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, filename) = pair.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!(
                    "allow-list entry '{pair}' must have the form key=filename"
                ))
            })?;
            Ok(ScriptEntry::new(key.trim(), filename.trim()))
        })
        .collect()
}

/// Keys: alphanumeric, hyphen, underscore, dot; at most 128 chars.
fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn is_bare_filename(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}

fn validate_allow_list(scripts: &[ScriptEntry]) -> CoreResult<()> {
    if scripts.is_empty() {
        return Err(CoreError::Validation(
            "script allow-list must contain at least one entry".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in scripts {
        if !is_safe_key(&entry.key) {
            return Err(CoreError::Validation(format!(
                "invalid script key '{}'",
                entry.key
            )));
        }
        if !is_bare_filename(&entry.filename) {
            return Err(CoreError::Validation(format!(
                "script '{}' must map to a bare file name (got '{}')",
                entry.key, entry.filename
            )));
        }
        if !seen.insert(entry.key.as_str()) {
            return Err(CoreError::Validation(format!(
                "duplicate script key '{}'",
                entry.key
            )));
        }
    }
    Ok(())
}
