//! Filesystem steps of a sync: staging reset, target replacement, ownership.

use std::io;
use std::path::Path;

use tokio::process::Command;

/// Remove `dir` if present and recreate it empty.
pub async fn reset_dir(dir: &Path) -> io::Result<()> {
    remove_dir_if_exists(dir).await?;
    tokio::fs::create_dir_all(dir).await
}

pub async fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Make `dst` a copy of `src`, removing whatever `dst` was before.
///
/// Uses a rename when both sit on the same filesystem and falls back to a
/// recursive copy otherwise.
pub async fn replace_dir(src: &Path, dst: &Path) -> io::Result<()> {
    remove_dir_if_exists(dst).await?;
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(error = %e, "rename failed, copying instead");
            copy_dir(src, dst).await
        }
    }
}

/// Copy `src` over `dst`, overwriting same-named files and keeping the rest.
pub async fn merge_dir(src: &Path, dst: &Path) -> io::Result<()> {
    copy_dir(src, dst).await
}

async fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dst))
        .await
        .map_err(io::Error::other)?
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// `chown -R owner:owner dir`. Returns whether it succeeded.
///
/// Never fails the caller: the service may legitimately run as an account
/// that cannot change ownership.
pub async fn normalize_ownership(dir: &Path, owner: &str) -> bool {
    let spec = format!("{owner}:{owner}");
    let result = Command::new("chown")
        .arg("-R")
        .arg(&spec)
        .arg(dir)
        .stdin(std::process::Stdio::null())
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            tracing::info!(owner, dir = %dir.display(), "Normalized script ownership");
            true
        }
        Ok(output) => {
            tracing::warn!(
                owner,
                dir = %dir.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Ownership normalization failed (non-fatal)"
            );
            false
        }
        Err(e) => {
            tracing::warn!(owner, error = %e, "Could not run chown (non-fatal)");
            false
        }
    }
}
