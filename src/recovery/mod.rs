//! Boot-time recovery after a firmware reflash, and the shutdown persist hook.
//!
//! A reflash wipes the application tree but keeps the persisted store. On
//! boot the orchestrator notices the missing tree, waits (bounded) for the
//! network, reinstalls the recorded release (or the newest one), merges the
//! new template with the persisted configuration and commits the result
//! through [`Activator`].
pub mod activation;
pub mod adapter;
pub mod network;

pub use activation::{Activated, Activation, Activator};
pub use adapter::{HostSystem, ReinstallPlan, SystemAdapter};

use std::fmt;
use std::time::Duration;

use crate::backup::{BackupHandle, BackupKind, BackupManager, age_cutoff};
use crate::config::bookkeeping::RecoveryBookkeeping;
use crate::config::merge::merge_files;
use crate::config::validation::Validator;
use crate::config::Settings;
use crate::error::{BackupError, RecoveryError};
use crate::resources::converge;
use crate::resources::helpers::fs::write_atomic;
use crate::resources::recovery_script::RecoveryScript;

/// Where the boot-time state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Tree present, or nothing persisted to recover.
    NotNeeded,
    /// Waiting for the network.
    AwaitingNetwork,
    /// Reinstalling the recorded release.
    InstallingPinned,
    /// Reinstalling the newest release.
    InstallingLatest,
    /// Merging the new template with the persisted configuration.
    MergingConfig,
    /// Validating the staged configuration.
    Validating,
    /// A valid configuration is live.
    Committed(Activation),
    /// Automated recovery gave up.
    Failed,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNeeded => f.write_str("not needed"),
            Self::AwaitingNetwork => f.write_str("awaiting network"),
            Self::InstallingPinned => f.write_str("installing pinned release"),
            Self::InstallingLatest => f.write_str("installing latest release"),
            Self::MergingConfig => f.write_str("merging configuration"),
            Self::Validating => f.write_str("validating"),
            Self::Committed(activation) => write!(f, "committed ({activation})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// What a boot run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Every state entered, in order.
    pub transitions: Vec<RecoveryState>,
    /// Release installed by this run.
    pub installed_version: Option<String>,
    /// Operator-facing notes.
    pub notes: Vec<String>,
    /// Commands to run by hand when the run failed.
    pub manual_steps: Vec<String>,
}

impl RecoveryOutcome {
    fn new() -> Self {
        Self {
            transitions: Vec::new(),
            installed_version: None,
            notes: Vec::new(),
            manual_steps: Vec::new(),
        }
    }

    /// The final state.
    #[must_use]
    pub fn state(&self) -> RecoveryState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RecoveryState::NotNeeded)
    }

    /// Whether the router ends up with a working configuration.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state() != RecoveryState::Failed
    }

    fn enter(&mut self, state: RecoveryState) {
        tracing::info!("recovery: {state}");
        self.transitions.push(state);
    }

    fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::info!("{note}");
        self.notes.push(note);
    }
}

/// What the shutdown hook persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Snapshots taken.
    pub snapshots: Vec<BackupHandle>,
    /// Number of snapshots pruned.
    pub pruned: usize,
    /// Whether the template was copied into the store.
    pub template_copied: bool,
    /// Problems that did not stop the hook.
    pub warnings: Vec<String>,
}

/// Drives boot-time recovery and the shutdown hook.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    system: &'a dyn SystemAdapter,
    backups: &'a BackupManager,
    validator: &'a Validator,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator over `system`, persisting through `backups`.
    #[must_use]
    pub const fn new(
        settings: &'a Settings,
        system: &'a dyn SystemAdapter,
        backups: &'a BackupManager,
        validator: &'a Validator,
    ) -> Self {
        Self {
            settings,
            system,
            backups,
            validator,
        }
    }

    /// Run the boot state machine to completion.
    #[must_use]
    pub fn run_boot(&self) -> RecoveryOutcome {
        let mut out = RecoveryOutcome::new();
        let live = self.settings.live_config_path();

        if self.system.app_tree_present() {
            out.enter(RecoveryState::NotNeeded);
            self.ensure_links(&mut out);
            return out;
        }
        let Ok(persisted) = std::fs::read_to_string(&live) else {
            out.enter(RecoveryState::NotNeeded);
            out.note("nothing to recover: no application tree and no persisted configuration");
            return out;
        };

        match self.backups.snapshot(BackupKind::Config, &live, "before boot recovery") {
            Ok(handle) => out.note(format!(
                "persisted configuration backed up to {}",
                self.backups.location(&handle.key)
            )),
            Err(e) => {
                tracing::warn!("pre-recovery snapshot skipped: {e}");
                out.notes.push(format!("pre-recovery snapshot skipped: {e}"));
            }
        }

        out.enter(RecoveryState::AwaitingNetwork);
        let wait = network::wait_for_network(
            self.system,
            Duration::from_secs(self.settings.recovery.poll_interval_secs),
            Duration::from_secs(self.settings.recovery.wait_ceiling_secs),
        );
        if !wait.is_reachable() {
            out.note("network still unreachable; attempting reinstall anyway");
        }

        let recorded = RecoveryBookkeeping::read(&persisted);
        let Some(version) = self.reinstall(recorded.as_ref(), &mut out) else {
            out.enter(RecoveryState::Failed);
            out.manual_steps = self.manual_steps(recorded.as_ref());
            return out;
        };
        out.installed_version = Some(version.clone());

        out.enter(RecoveryState::MergingConfig);
        let template = self.settings.template_path();
        let merged = match merge_files(&template, &live) {
            Ok(result) => {
                for diagnostic in &result.diagnostics {
                    tracing::warn!("merge: {diagnostic}");
                }
                result.merged
            }
            Err(e) => {
                out.note(format!("merge failed: {e}"));
                out.enter(RecoveryState::Failed);
                out.manual_steps = self.manual_steps(recorded.as_ref());
                return out;
            }
        };
        let fresh = fresh_bookkeeping(self.settings, &version);
        let defaults = std::fs::read_to_string(&template).unwrap_or_default();

        out.enter(RecoveryState::Validating);
        let activator = Activator::new(self.backups, self.validator);
        match activator.activate(&live, &merged, &defaults, &fresh) {
            Ok(activated) => {
                for note in activated.notes {
                    out.note(note);
                }
                out.enter(RecoveryState::Committed(activated.activation));
            }
            Err(e) => {
                out.note(format!("activation failed: {e}"));
                out.enter(RecoveryState::Failed);
                out.manual_steps = self.manual_steps(recorded.as_ref());
                return out;
            }
        }

        self.after_commit(&version, &mut out);
        out
    }

    /// Shutdown hook: snapshot the live config and template, then prune.
    #[must_use]
    pub fn persist(&self) -> PersistReport {
        let mut report = PersistReport::default();

        for (kind, path) in [
            (BackupKind::Config, self.settings.live_config_path()),
            (BackupKind::Template, self.settings.template_path()),
        ] {
            match self.backups.snapshot(kind, &path, "shutdown") {
                Ok(handle) => report.snapshots.push(handle),
                Err(BackupError::SourceMissing(_)) => {
                    tracing::debug!("no {kind} to persist at {}", path.display());
                }
                Err(e) => report.warnings.push(format!("{kind} snapshot: {e}")),
            }
        }

        if let Ok(template) = std::fs::read(self.settings.template_path()) {
            match write_atomic(&self.settings.persisted_template_path(), &template) {
                Ok(()) => report.template_copied = true,
                Err(e) => report.warnings.push(format!("template copy: {e:#}")),
            }
        }

        for kind in BackupKind::ALL {
            match self.backups.prune(kind, self.settings.backup.retain) {
                Ok(removed) => report.pruned += removed.len(),
                Err(e) => report.warnings.push(format!("prune {kind}: {e}")),
            }
        }
        if let Some(cutoff) = age_cutoff(self.settings.backup.max_age_days) {
            match self.backups.prune_older_than(cutoff) {
                Ok(removed) => report.pruned += removed.len(),
                Err(e) => report.warnings.push(format!("age prune: {e}")),
            }
        }

        for warning in &report.warnings {
            tracing::warn!("persist: {warning}");
        }
        report
    }

    /// Pinned first (when recorded), then latest. Returns the installed version.
    fn reinstall(
        &self,
        recorded: Option<&RecoveryBookkeeping>,
        out: &mut RecoveryOutcome,
    ) -> Option<String> {
        let release = &self.settings.release;

        out.enter(RecoveryState::InstallingPinned);
        let pinned_failure = match recorded {
            Some(bk) => {
                let plan = ReinstallPlan::Pinned {
                    version: bk.installed_version.clone(),
                    urls: release.pinned_for(&bk.installed_version),
                };
                match self.attempt(&plan) {
                    Ok(version) => return Some(version),
                    Err(e) => e,
                }
            }
            None => "no recorded version".to_string(),
        };
        out.note(format!("pinned reinstall unavailable: {pinned_failure}"));

        out.enter(RecoveryState::InstallingLatest);
        let plan = ReinstallPlan::Latest {
            urls: release.latest_urls.clone(),
        };
        match self.attempt(&plan) {
            Ok(version) => Some(version),
            Err(latest) => {
                let err = RecoveryError::ReinstallExhausted {
                    pinned: pinned_failure,
                    latest,
                };
                tracing::error!("{err}");
                out.notes.push(err.to_string());
                None
            }
        }
    }

    fn attempt(&self, plan: &ReinstallPlan) -> Result<String, String> {
        match self.system.reinstall(plan) {
            Ok(_) if !self.settings.template_path().is_file() => {
                Err("installer left no template behind".to_string())
            }
            Ok(version) => Ok(version),
            Err(e) => Err(format!("{e:#}")),
        }
    }

    fn after_commit(&self, version: &str, out: &mut RecoveryOutcome) {
        let script = recovery_script(self.settings, version);
        match converge(&script) {
            Ok(_) => out.note(format!("recovery script pinned to {version}")),
            Err(e) => out.note(format!("recovery script not written: {e:#}")),
        }
        self.ensure_links(out);
        if let Err(e) = self.system.restart_agent() {
            tracing::warn!("agent restart failed: {e:#}");
            out.notes.push(format!("agent restart failed: {e:#}"));
        }
    }

    fn ensure_links(&self, out: &mut RecoveryOutcome) {
        match self.system.ensure_links() {
            Ok(changed) => {
                for link in changed {
                    out.note(format!("repaired link {link}"));
                }
            }
            Err(e) => {
                tracing::warn!("links not repaired: {e:#}");
                out.notes.push(format!("links not repaired: {e:#}"));
            }
        }
    }

    fn manual_steps(&self, recorded: Option<&RecoveryBookkeeping>) -> Vec<String> {
        let release = &self.settings.release;
        let (version, url) = recorded.map_or_else(
            || ("latest".to_string(), release.latest_urls.first().cloned()),
            |bk| {
                let url = if bk.recovery_url.is_empty() {
                    release.pinned_for(&bk.installed_version).into_iter().next()
                } else {
                    Some(bk.recovery_url.clone())
                };
                (bk.installed_version.clone(), url)
            },
        );
        let mut steps = Vec::new();
        let script = self.settings.recovery_script_path();
        if script.is_file() {
            steps.push(format!("sh {}", script.display()));
        }
        if let Some(url) = url {
            steps.push(format!(
                "curl -fsSL -o /tmp/install.sh {url} && VERSION={version} sh /tmp/install.sh"
            ));
        }
        steps.push(format!(
            "your configuration is untouched at {}",
            self.settings.live_config_path().display()
        ));
        steps
    }
}

/// Bookkeeping for `version`, stamped now, pointing at its primary pinned URL.
#[must_use]
pub fn fresh_bookkeeping(settings: &Settings, version: &str) -> RecoveryBookkeeping {
    let url = settings
        .release
        .pinned_for(version)
        .into_iter()
        .next()
        .unwrap_or_default();
    RecoveryBookkeeping::fresh(version, url)
}

/// The version-pinned recovery script for `version`.
#[must_use]
pub fn recovery_script(settings: &Settings, version: &str) -> RecoveryScript {
    let mut urls = settings.release.pinned_for(version).into_iter();
    RecoveryScript {
        path: settings.recovery_script_path(),
        pinned_version: version.to_string(),
        primary_url: urls.next().unwrap_or_default(),
        fallback_url: urls.next().unwrap_or_default(),
        install_dir: settings.paths.install_dir.clone(),
    }
}
