//! Repository materialization: shallow sparse fetch of the scripts
//! subdirectory, then replacement of the target directory.
//!
//! Pipeline (each failure aborts with the failing step's diagnostics):
//!
//! 1. Reset the staging directory.
//! 2. `git init`, add remote, shallow fetch of one branch.
//! 3. Cone-mode sparse checkout of the scripts subdirectory only.
//! 4. Verify the subdirectory exists (`SparseCheckoutEmpty` otherwise).
//! 5. Replace (or merge into) the target directory.
//! 6. `chown -R` to the configured owner (non-fatal).
//! 7. Add execute bits to every script file.
//!
//! Runs against the same target are serialized.

pub mod fs_ops;
pub mod git;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ScriptsConfig, SCRIPT_EXTENSION};
use crate::error::{CoreError, CoreResult};
use crate::scripting::permissions::ensure_executable_in_dir;

/// Input for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSpec {
    pub repo_url: String,
    pub branch: String,
    pub target_dir: PathBuf,
    /// Replace the target outright. When `false`, fetched files are merged
    /// over the existing target and unrelated files are kept.
    pub clean: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub status: &'static str,
    pub repo: String,
    pub branch: String,
    pub target_dir: PathBuf,
    /// Entry names of the target directory after the sync, sorted.
    pub files: Vec<String>,
    /// Whether the ownership step ran and succeeded.
    pub ownership_normalized: bool,
    pub synced_at: DateTime<Utc>,
}

type TargetLocks = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Populates a script directory from a remote repository.
#[derive(Debug, Clone)]
pub struct RepositorySync {
    config: Arc<ScriptsConfig>,
    locks: Arc<TargetLocks>,
}

impl RepositorySync {
    pub fn new(config: Arc<ScriptsConfig>) -> Self {
        Self {
            config,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fill unset request fields from configuration. `clean` defaults to `true`.
    pub fn spec(
        &self,
        repo_url: Option<String>,
        branch: Option<String>,
        clean: Option<bool>,
    ) -> SyncSpec {
        let repo = &self.config.repo;
        SyncSpec {
            repo_url: repo_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| repo.default_repo_url.clone()),
            branch: branch
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| repo.default_branch.clone()),
            target_dir: self.config.target_dir().to_path_buf(),
            clean: clean.unwrap_or(true),
        }
    }

    /// Run the pipeline for `spec`. Option-shaped or malformed values are
    /// rejected with [`CoreError::Validation`] before git is invoked.
    pub async fn sync(&self, spec: &SyncSpec) -> CoreResult<SyncOutcome> {
        git::validate_arg("repo_url", &spec.repo_url)?;
        git::validate_arg("branch", &spec.branch)?;
        git::validate_arg("subdir", &self.config.repo.subdir)?;

        let lock = self.lock_for(&spec.target_dir);
        let _guard = lock.lock().await;

        let staging = self.staging_dir_for(&spec.target_dir);
        tracing::info!(
            repo = %spec.repo_url,
            branch = %spec.branch,
            target = %spec.target_dir.display(),
            clean = spec.clean,
            "Starting script sync"
        );

        let result = self.sync_locked(spec, &staging).await;

        if let Err(e) = fs_ops::remove_dir_if_exists(&staging).await {
            tracing::debug!(staging = %staging.display(), error = %e, "Could not clean staging");
        }
        match &result {
            Ok(outcome) => {
                tracing::info!(files = outcome.files.len(), "Script sync complete")
            }
            Err(e) => tracing::error!(error = %e, "Script sync failed"),
        }
        result
    }

    async fn sync_locked(&self, spec: &SyncSpec, staging: &Path) -> CoreResult<SyncOutcome> {
        let subdir = &self.config.repo.subdir;

        fs_ops::reset_dir(staging).await?;

        for step in git::STEPS {
            let args = git::step_args(step, &spec.repo_url, &spec.branch, subdir);
            git::run_step(step, staging, &args).await?;
        }

        let fetched = staging.join(subdir);
        if !tokio::fs::metadata(&fetched)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(CoreError::SparseCheckoutEmpty {
                subdir: subdir.clone(),
            });
        }

        let target_exists = tokio::fs::metadata(&spec.target_dir).await.is_ok();
        if spec.clean || !target_exists {
            fs_ops::replace_dir(&fetched, &spec.target_dir).await?;
        } else {
            fs_ops::merge_dir(&fetched, &spec.target_dir).await?;
        }

        let ownership_normalized = match &self.config.repo.owner {
            Some(owner) => fs_ops::normalize_ownership(&spec.target_dir, owner).await,
            None => {
                tracing::debug!("No script owner configured, skipping chown");
                false
            }
        };

        let changed = ensure_executable_in_dir(&spec.target_dir, SCRIPT_EXTENSION).await?;
        tracing::debug!(count = changed.len(), "Marked scripts executable");

        Ok(SyncOutcome {
            status: "ok",
            repo: spec.repo_url.clone(),
            branch: spec.branch.clone(),
            target_dir: spec.target_dir.clone(),
            files: list_names(&spec.target_dir).await?,
            ownership_normalized,
            synced_at: Utc::now(),
        })
    }

    fn lock_for(&self, target: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(target.to_path_buf()).or_default())
    }

    /// One staging directory per target so unrelated targets never collide.
    fn staging_dir_for(&self, target: &Path) -> PathBuf {
        let name: String = target
            .to_string_lossy()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.config.repo.staging_dir.join(name)
    }
}

async fn list_names(dir: &Path) -> CoreResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
