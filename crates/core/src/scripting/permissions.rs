//! Execute-bit helpers.
//!
//! All changes are additive: bits are only ever added, never cleared.

use std::fs::Metadata;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const EXEC_BITS: u32 = 0o111;

pub fn is_executable(metadata: &Metadata) -> bool {
    metadata.permissions().mode() & EXEC_BITS != 0
}

/// Add `u+x,g+x,o+x` to `path` if any of them is missing.
///
/// Returns `true` when the mode was changed.
pub async fn ensure_executable(path: &Path) -> io::Result<bool> {
    let metadata = tokio::fs::metadata(path).await?;
    let mode = metadata.permissions().mode();
    if mode & EXEC_BITS == EXEC_BITS {
        return Ok(false);
    }
    let mut perms = metadata.permissions();
    perms.set_mode(mode | EXEC_BITS);
    tokio::fs::set_permissions(path, perms).await?;
    tracing::debug!(path = %path.display(), old_mode = %format!("{mode:o}"), "Added execute bits");
    Ok(true)
}

/// Apply [`ensure_executable`] to every regular file in `dir` (not recursive)
/// whose extension is `extension`. Returns the files that were changed.
pub async fn ensure_executable_in_dir(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut changed = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if ensure_executable(&path).await? {
            changed.push(path);
        }
    }
    changed.sort();
    Ok(changed)
}
