//! `git` invocations for the sparse fetch.

use std::path::Path;

use tokio::process::Command;

use crate::error::{CoreError, CoreResult, SyncStep};

/// Transports a sync may use. `ext::` and friends would run commands.
const ALLOWED_PROTOCOLS: &str = "file:git:http:https:ssh";

/// Reject values git would parse as an option or that cannot name a ref,
/// URL or path. Every step argument that comes from a caller passes here.
pub fn validate_arg(field: &str, value: &str) -> CoreResult<()> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if value.starts_with('-') {
        return Err(CoreError::Validation(format!(
            "{field} must not start with '-': {value}"
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::Validation(format!(
            "{field} must not contain whitespace or control characters"
        )));
    }
    Ok(())
}

/// Arguments for each step, in pipeline order.
pub fn step_args(step: SyncStep, repo_url: &str, branch: &str, subdir: &str) -> Vec<String> {
    let args: &[&str] = match step {
        SyncStep::Init => &["init"],
        SyncStep::RemoteAdd => &["remote", "add", "--", "origin", repo_url],
        SyncStep::Fetch => &["fetch", "--depth", "1", "--", "origin", branch],
        SyncStep::SparseInit => &["sparse-checkout", "init", "--cone"],
        SyncStep::SparseSet => &["sparse-checkout", "set", subdir],
        SyncStep::Checkout => &["checkout", branch],
    };
    args.iter().map(|s| s.to_string()).collect()
}

pub const STEPS: [SyncStep; 6] = [
    SyncStep::Init,
    SyncStep::RemoteAdd,
    SyncStep::Fetch,
    SyncStep::SparseInit,
    SyncStep::SparseSet,
    SyncStep::Checkout,
];

/// Run one git step inside `workdir`, failing with the captured output.
pub async fn run_step(step: SyncStep, workdir: &Path, args: &[String]) -> CoreResult<()> {
    tracing::debug!(%step, ?args, workdir = %workdir.display(), "Running git step");

    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        // Never block on a credential prompt.
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_ALLOW_PROTOCOL", ALLOWED_PROTOCOLS)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CoreError::VcsStepFailed {
            step,
            stdout: String::new(),
            stderr: format!("Failed to spawn git: {e}"),
        })?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::error!(
            %step,
            exit_code = output.status.code().unwrap_or(-1),
            stderr = %stderr.trim(),
            "git step failed"
        );
        return Err(CoreError::VcsStepFailed {
            step,
            stdout,
            stderr,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_is_shallow_and_branch_scoped() {
        assert_eq!(
            step_args(SyncStep::Fetch, "https://example.com/r", "dev", "scripts"),
            vec!["fetch", "--depth", "1", "--", "origin", "dev"]
        );
    }

    #[test]
    fn remote_url_follows_end_of_options() {
        assert_eq!(
            step_args(SyncStep::RemoteAdd, "file:///srv/r", "b", "s"),
            vec!["remote", "add", "--", "origin", "file:///srv/r"]
        );
    }

    #[test]
    fn option_shaped_values_are_rejected() {
        for value in [
            "--upload-pack=touch /tmp/x; git-upload-pack",
            "-b",
            "",
            "main branch",
            "main\n",
        ] {
            assert!(
                matches!(validate_arg("branch", value), Err(CoreError::Validation(_))),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn ordinary_refs_and_urls_pass() {
        for value in ["main", "release/1.2", "file:///tmp/r", "git@host:org/repo.git"] {
            assert!(validate_arg("value", value).is_ok(), "{value:?} should pass");
        }
    }

    #[test]
    fn sparse_set_names_only_the_subdir() {
        assert_eq!(
            step_args(SyncStep::SparseSet, "u", "b", "tools/scripts"),
            vec!["sparse-checkout", "set", "tools/scripts"]
        );
    }

    #[test]
    fn steps_run_in_pipeline_order() {
        assert_eq!(STEPS.first(), Some(&SyncStep::Init));
        assert_eq!(STEPS.last(), Some(&SyncStep::Checkout));
    }
}
