//! Convenience symlink resource.
use anyhow::{Context as _, Result};
use std::path::PathBuf;

use super::helpers::fs::{ensure_parent_dir, remove_existing};
use super::{Applicable, Resource, ResourceChange, ResourceState};

/// A symlink at `link` pointing into the application tree.
#[derive(Debug, Clone)]
pub struct SymlinkResource {
    /// What the symlink points to.
    pub source: PathBuf,
    /// Where the symlink is created.
    pub target: PathBuf,
}

impl SymlinkResource {
    /// Create a new symlink resource.
    #[must_use]
    pub const fn new(source: PathBuf, target: PathBuf) -> Self {
        Self { source, target }
    }
}

impl Applicable for SymlinkResource {
    fn description(&self) -> String {
        format!("{} -> {}", self.target.display(), self.source.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        ensure_parent_dir(&self.target)?;
        remove_existing(&self.target)?;
        create_symlink(&self.source, &self.target)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for SymlinkResource {
    fn current_state(&self) -> Result<ResourceState> {
        if !self.source.exists() {
            return Ok(ResourceState::Invalid {
                reason: format!("source does not exist: {}", self.source.display()),
            });
        }

        let is_real_dir = self
            .target
            .symlink_metadata()
            .is_ok_and(|m| m.is_dir() && !m.is_symlink());
        if is_real_dir {
            return Ok(ResourceState::Invalid {
                reason: "target is a real directory".to_string(),
            });
        }

        match std::fs::read_link(&self.target) {
            Ok(existing) if existing == self.source => Ok(ResourceState::Correct),
            Ok(existing) => Ok(ResourceState::Incorrect {
                current: format!("points to {}", existing.display()),
            }),
            Err(_) if self.target.exists() => Ok(ResourceState::Incorrect {
                current: "target is a regular file".to_string(),
            }),
            Err(_) => Ok(ResourceState::Missing),
        }
    }
}

#[cfg(unix)]
fn create_symlink(source: &std::path::Path, link: &std::path::Path) -> Result<()> {
    std::os::unix::fs::symlink(source, link)
        .with_context(|| format!("creating symlink {} -> {}", link.display(), source.display()))
}

#[cfg(not(unix))]
fn create_symlink(source: &std::path::Path, link: &std::path::Path) -> Result<()> {
    anyhow::bail!(
        "symlinks are not supported on this platform: {} -> {}",
        link.display(),
        source.display()
    )
}
