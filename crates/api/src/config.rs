use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use scriptgate_core::config::{
    parse_allow_list, RepoConfig, ScriptEntry, ScriptsConfig, DEFAULT_LINE_BUFFER,
};
use scriptgate_core::error::CoreError;

/// Allow-list used when `SCRIPTS_ALLOWLIST` is unset.
pub const DEFAULT_ALLOW_LIST: [&str; 4] = [
    "os_flashing",
    "remove_os_flashing",
    "remove_streaming_hid",
    "streaming_hid",
];

/// Invalid startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Invalid script configuration: {0}")]
    Scripts(#[from] CoreError),
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-board device running the
/// service as its only HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins. A single `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Time allowed to produce response headers (default: `600`).
    /// Streaming bodies are not cut by it.
    pub request_timeout_secs: u64,
    /// Script allow-list, target directory and sync settings.
    pub scripts: Arc<ScriptsConfig>,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                                   |
    /// |------------------------|-------------------------------------------|
    /// | `HOST`                 | `0.0.0.0`                                 |
    /// | `PORT`                 | `8000`                                    |
    /// | `CORS_ORIGINS`         | `*`                                       |
    /// | `REQUEST_TIMEOUT_SECS` | `600`                                     |
    /// | `SCRIPTS_TARGET_DIR`   | `/home/<SUDO_USER or USER or rpi>/scripts`|
    /// | `SCRIPTS_ALLOWLIST`    | [`DEFAULT_ALLOW_LIST`], `key=key.sh`      |
    /// | `SCRIPTS_REPO_URL`     | see [`RepoConfig::default`]               |
    /// | `SCRIPTS_BRANCH`       | `main`                                    |
    /// | `SCRIPTS_SUBDIR`       | `scripts`                                 |
    /// | `SCRIPTS_STAGING_DIR`  | `<tmp>/scripts_sparse_clone`              |
    /// | `SCRIPTS_OWNER`        | `SUDO_USER`, then `USER`                  |
    /// | `SCRIPTS_SHELL`        | `/bin/bash`                               |
    /// | `SCRIPTS_ELEVATION`    | empty                                     |
    /// | `SCRIPTS_LINE_BUFFER`  | `stdbuf -oL -eL` (set empty to disable)   |
    /// | `SCRIPT_TIMEOUT_SECS`  | unset (no limit)                          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = env.parse("PORT")?.unwrap_or(8000);
        let request_timeout_secs: u64 = env.parse("REQUEST_TIMEOUT_SECS")?.unwrap_or(600);

        let cors_origins = split_list(&env.get("CORS_ORIGINS").unwrap_or_else(|| "*".into()));
        for origin in cors_origins.iter().filter(|o| o.as_str() != "*") {
            HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                var: "CORS_ORIGINS",
                reason: format!("'{origin}': {e}"),
            })?;
        }

        let login = env.get("SUDO_USER").or_else(|| env.get("USER"));

        let target_dir = env.get("SCRIPTS_TARGET_DIR").map(PathBuf::from).unwrap_or_else(|| {
            PathBuf::from("/home")
                .join(login.as_deref().unwrap_or("rpi"))
                .join("scripts")
        });

        let entries = match env.get("SCRIPTS_ALLOWLIST") {
            Some(raw) => parse_allow_list(&raw)?,
            None => DEFAULT_ALLOW_LIST
                .iter()
                .map(|key| ScriptEntry::new(*key, format!("{key}.sh")))
                .collect(),
        };

        let mut scripts = ScriptsConfig::new(target_dir, entries)?;

        if let Some(shell) = env.get("SCRIPTS_SHELL") {
            scripts.shell = PathBuf::from(shell);
        }
        scripts.elevation = env
            .raw("SCRIPTS_ELEVATION")
            .map(|v| split_words(&v))
            .unwrap_or_default();
        scripts.line_buffer = env
            .raw("SCRIPTS_LINE_BUFFER")
            .map(|v| split_words(&v))
            .unwrap_or_else(|| DEFAULT_LINE_BUFFER.iter().map(|s| s.to_string()).collect());
        scripts.run_timeout = env
            .parse::<u64>("SCRIPT_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let defaults = RepoConfig::default();
        scripts.repo = RepoConfig {
            default_repo_url: env
                .get("SCRIPTS_REPO_URL")
                .unwrap_or(defaults.default_repo_url),
            default_branch: env.get("SCRIPTS_BRANCH").unwrap_or(defaults.default_branch),
            subdir: env.get("SCRIPTS_SUBDIR").unwrap_or(defaults.subdir),
            staging_dir: env
                .get("SCRIPTS_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            owner: env.get("SCRIPTS_OWNER").or(login),
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            scripts: Arc::new(scripts),
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Unmodified value, present even when empty.
    fn raw(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }

    /// Trimmed value; empty counts as unset.
    fn get(&self, name: &str) -> Option<String> {
        self.raw(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(name)
            .map(|v| {
                v.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    var: name,
                    reason: format!("'{v}': {e}"),
                })
            })
            .transpose()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_words(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
