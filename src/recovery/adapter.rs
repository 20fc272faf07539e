//! Side effects of the boot-time recovery, behind [`SystemAdapter`].
use anyhow::{Context as _, Result, bail};
use std::sync::Arc;
use std::time::Duration;

use super::network::NetworkProbe;
use crate::config::Settings;
use crate::download::{DownloadSource, Downloader, ExpectedKind};
use crate::exec::Executor;
use crate::resources::symlink::SymlinkResource;
use crate::resources::{Applicable as _, ResourceChange, converge};

/// Which release to reinstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReinstallPlan {
    /// The version recorded at the last install.
    Pinned {
        /// Recorded version.
        version: String,
        /// Installer URLs, primary first.
        urls: Vec<String>,
    },
    /// The newest published release.
    Latest {
        /// Installer URLs, primary first.
        urls: Vec<String>,
    },
}

impl ReinstallPlan {
    /// Installer URLs, primary first.
    #[must_use]
    pub fn urls(&self) -> &[String] {
        match self {
            Self::Pinned { urls, .. } | Self::Latest { urls } => urls,
        }
    }

    /// Value passed to the installer as `VERSION`.
    #[must_use]
    pub fn version(&self) -> &str {
        match self {
            Self::Pinned { version, .. } => version,
            Self::Latest { .. } => "latest",
        }
    }
}

/// Host operations the recovery orchestrator depends on.
pub trait SystemAdapter: NetworkProbe + std::fmt::Debug {
    /// Whether the application tree (and its template) is installed.
    fn app_tree_present(&self) -> bool;

    /// Create or repair the convenience links; returns what changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a link cannot be written.
    fn ensure_links(&self) -> Result<Vec<String>>;

    /// Download and run the installer; returns the installed version.
    ///
    /// # Errors
    ///
    /// Returns an error if every source fails or the installer exits non-zero.
    fn reinstall(&self, plan: &ReinstallPlan) -> Result<String>;

    /// Restart the monitoring agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the init script fails.
    fn restart_agent(&self) -> Result<()>;
}

/// [`SystemAdapter`] for the real router.
#[derive(Debug, Clone)]
pub struct HostSystem {
    settings: Settings,
    executor: Arc<dyn Executor>,
}

impl HostSystem {
    /// Adapter over `settings` paths, shelling out through `executor`.
    #[must_use]
    pub fn new(settings: Settings, executor: Arc<dyn Executor>) -> Self {
        Self { settings, executor }
    }
}

impl NetworkProbe for HostSystem {
    fn reachable(&self) -> bool {
        self.settings.recovery.probe_hosts.iter().any(|host| {
            self.executor
                .run_unchecked("ping", &["-c", "1", "-W", "2", host])
                .is_ok_and(|r| r.success)
        })
    }

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl SystemAdapter for HostSystem {
    fn app_tree_present(&self) -> bool {
        self.settings.paths.install_dir.is_dir() && self.settings.template_path().is_file()
    }

    fn ensure_links(&self) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        for entry in &self.settings.links {
            let link = SymlinkResource::new(self.settings.link_target(entry), entry.link.clone());
            match converge(&link)? {
                ResourceChange::Applied => changed.push(link.description()),
                ResourceChange::AlreadyCorrect => {}
                ResourceChange::Skipped { reason } => {
                    tracing::debug!("skipping link {}: {reason}", link.description());
                }
            }
        }
        Ok(changed)
    }

    fn reinstall(&self, plan: &ReinstallPlan) -> Result<String> {
        let sources: Vec<DownloadSource> = plan
            .urls()
            .iter()
            .map(|url| DownloadSource::new(url.clone(), ExpectedKind::ShellScript))
            .collect();
        let work_dir = self.settings.paths.persist_dir.join("recovery");
        let installer = work_dir.join("install.sh");
        Downloader::new(self.executor.as_ref()).fetch_first(&sources, &installer)?;

        let installer_str = installer
            .to_str()
            .context("installer path is not valid UTF-8")?;
        let install_dir = self.settings.paths.install_dir.display().to_string();
        let result = self.executor.run_in_with_env(
            &work_dir,
            "sh",
            &[installer_str],
            &[("VERSION", plan.version()), ("INSTALL_DIR", &install_dir)],
        );
        let _ = std::fs::remove_file(&installer);
        result.with_context(|| format!("running installer for {}", plan.version()))?;

        if !self.settings.template_path().is_file() {
            bail!(
                "installer finished but {} is missing",
                self.settings.template_path().display()
            );
        }
        let recorded = std::fs::read_to_string(self.settings.version_file())
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(recorded.unwrap_or_else(|| plan.version().to_string()))
    }

    fn restart_agent(&self) -> Result<()> {
        let script = format!("/etc/init.d/{}", self.settings.recovery.service);
        self.executor.run(&script, &["restart"])?;
        Ok(())
    }
}
