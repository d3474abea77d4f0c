use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Named step of the repository sync pipeline that shells out to `git`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Init,
    RemoteAdd,
    Fetch,
    SparseInit,
    SparseSet,
    Checkout,
}

impl SyncStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::RemoteAdd => "remote_add",
            Self::Fetch => "fetch",
            Self::SparseInit => "sparse_init",
            Self::SparseSet => "sparse_set",
            Self::Checkout => "checkout",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The key is not on the allow-list.
    #[error("Unknown script key '{0}'")]
    UnknownScript(String),

    /// The key is allow-listed but its file is not on disk.
    #[error("Script not found: {}", path.display())]
    ScriptMissing { key: String, path: PathBuf },

    /// The OS refused to launch the process.
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("git {step} failed\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    VcsStepFailed {
        step: SyncStep,
        stdout: String,
        stderr: String,
    },

    #[error("Sparse checkout succeeded but '{subdir}' folder not found in repository")]
    SparseCheckoutEmpty { subdir: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_script() {
        let err = CoreError::UnknownScript("rm_everything".to_string());
        assert_eq!(err.to_string(), "Unknown script key 'rm_everything'");
    }

    #[test]
    fn display_script_missing() {
        let err = CoreError::ScriptMissing {
            key: "os_flashing".to_string(),
            path: PathBuf::from("/home/rpi/scripts/os_flashing.sh"),
        };
        assert_eq!(
            err.to_string(),
            "Script not found: /home/rpi/scripts/os_flashing.sh"
        );
    }

    #[test]
    fn display_vcs_step_carries_captured_output() {
        let err = CoreError::VcsStepFailed {
            step: SyncStep::Fetch,
            stdout: String::new(),
            stderr: "fatal: couldn't find remote ref nope".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("git fetch failed"));
        assert!(msg.contains("couldn't find remote ref nope"));
    }

    #[test]
    fn spawn_failed_has_io_source() {
        let err = CoreError::SpawnFailed {
            program: "/bin/nope".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn sync_step_serializes_snake_case() {
        let json = serde_json::to_value(SyncStep::SparseInit).unwrap();
        assert_eq!(json, "sparse_init");
    }
}
