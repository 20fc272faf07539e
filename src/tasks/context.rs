//! Shared state handed to every task.
use std::sync::Arc;

use crate::backup::BackupManager;
use crate::config::Settings;
use crate::config::validation::Validator;
use crate::exec::Executor;
use crate::logging::Log;
use crate::store::FsStore;

/// Shared context for task execution.
pub struct Context {
    /// Installer settings, already re-rooted.
    pub settings: Arc<Settings>,
    /// Logger for output and task recording.
    pub log: Arc<dyn Log>,
    /// Whether to perform a dry run (preview changes without applying).
    pub dry_run: bool,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Validator configured from the settings.
    pub validator: Arc<Validator>,
    /// Backup ring in the persisted store.
    pub backups: Arc<BackupManager>,
    /// Release requested on the command line, if any.
    pub release: Option<String>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("settings", &self.settings)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .field("executor", &"<dyn Executor>")
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a new context whose backups live under the persist directory.
    #[must_use]
    pub fn new(
        settings: Settings,
        log: Arc<dyn Log>,
        dry_run: bool,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let validator = Validator::new(Arc::clone(&executor), settings.validation.clone());
        let store = Arc::new(FsStore::new(&settings.paths.persist_dir));
        let backups =
            BackupManager::new(store, validator.clone()).with_compression(settings.backup.compress);
        Self {
            settings: Arc::new(settings),
            log,
            dry_run,
            executor,
            validator: Arc::new(validator),
            backups: Arc::new(backups),
            release: None,
        }
    }

    /// Create a copy of this context with a different logger.
    #[must_use]
    pub fn with_log(&self, log: Arc<dyn Log>) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            log,
            dry_run: self.dry_run,
            executor: Arc::clone(&self.executor),
            validator: Arc::clone(&self.validator),
            backups: Arc::clone(&self.backups),
            release: self.release.clone(),
        }
    }

    /// Same context with dry-run switched on or off.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Same context pinned to `release` (from `install --release`).
    #[must_use]
    pub fn with_release(mut self, release: Option<String>) -> Self {
        self.release = release;
        self
    }

    /// Release the installer should fetch: command line, then settings.
    #[must_use]
    pub fn requested_release(&self) -> Option<String> {
        self.release
            .clone()
            .or_else(|| self.settings.release.version.clone())
    }

    /// Version of the installed tree.
    ///
    /// Read from the tree's `VERSION` file, falling back to the requested
    /// release.
    #[must_use]
    pub fn installed_version(&self) -> Option<String> {
        std::fs::read_to_string(self.settings.version_file())
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| self.requested_release())
    }
}
