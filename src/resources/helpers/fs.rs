//! File-system resource helpers.
use anyhow::{Context as _, Result};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Remove an existing file or symlink at `path`, including broken symlinks.
///
/// Does nothing if `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() || path.symlink_metadata().is_ok() {
        std::fs::remove_file(path)
            .with_context(|| format!("remove existing: {}", path.display()))?;
    }
    Ok(())
}

/// Sibling path used to stage a write to `path` (`<name>.new`).
#[must_use]
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".new");
    path.with_file_name(name)
}

/// Write `bytes` to a temporary sibling and rename it over `path`.
///
/// Readers see either the old content or the new content, never a partial
/// file. The staged file is synced before the rename.
///
/// # Errors
///
/// Returns an error if the parent cannot be created or the write or rename
/// fails. A failed write leaves `path` untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let staged = tmp_path(path);
    let write = || -> Result<()> {
        let mut file = std::fs::File::create(&staged)
            .with_context(|| format!("create staging file: {}", staged.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("write staging file: {}", staged.display()))?;
        file.sync_all()
            .with_context(|| format!("sync staging file: {}", staged.display()))?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = std::fs::remove_file(&staged);
        return Err(e);
    }
    promote(&staged, path)
}

/// Atomically move an already-staged file over `path`.
///
/// # Errors
///
/// Returns an error if the rename fails; the staged file is removed.
pub fn promote(staged: &Path, path: &Path) -> Result<()> {
    std::fs::rename(staged, path).map_err(|e| {
        let _ = std::fs::remove_file(staged);
        anyhow::Error::new(e).context(format!(
            "move {} into place at {}",
            staged.display(),
            path.display()
        ))
    })
}

/// Set the Unix permission bits of `path`.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod {mode:o} {}", path.display()))
}

/// No-op off Unix.
///
/// # Errors
///
/// Never fails.
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
