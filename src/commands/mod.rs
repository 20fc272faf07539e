//! Top-level subcommand handlers.
pub mod backup;
pub mod install;
pub mod merge;
pub mod start;
pub mod stop;
pub mod validate;
pub mod version;

use anyhow::{Context as _, Result};
use std::sync::Arc;

use crate::cli::GlobalOpts;
use crate::config::Settings;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger, TaskStatus};
use crate::tasks::{self, Context, Task, graph};

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Loaded and re-rooted settings.
    pub settings: Settings,
}

impl CommandSetup {
    /// Load the settings named by the global options and apply `--root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be parsed.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let path = Settings::resolve_path(global.settings.as_deref());
        log.debug(&format!("settings: {}", path.display()));
        let mut settings = Settings::load(&path)?;
        if let Some(root) = &global.root {
            log.info(&format!("re-rooting managed paths under {}", root.display()));
            settings = settings.rerooted(root);
        }
        log.debug(&format!(
            "install dir {}, persist dir {}",
            settings.paths.install_dir.display(),
            settings.paths.persist_dir.display()
        ));
        Ok(Self { settings })
    }

    /// Task context over the real system.
    #[must_use]
    pub fn context(&self, global: &GlobalOpts, log: &Arc<Logger>) -> Context {
        self.context_with(global, log, Arc::new(SystemExecutor))
    }

    /// Task context shelling out through `executor`.
    #[must_use]
    pub fn context_with(
        &self,
        global: &GlobalOpts,
        log: &Arc<Logger>,
        executor: Arc<dyn Executor>,
    ) -> Context {
        Context::new(
            self.settings.clone(),
            Arc::clone(log) as Arc<dyn Log>,
            global.dry_run,
            executor,
        )
    }
}

/// Execute tasks in dependency order, print the summary, and bail if any
/// task failed.
///
/// Once a [critical](Task::critical) task fails, the remaining tasks are
/// recorded as skipped without running.
///
/// # Errors
///
/// Returns an error if the dependency graph has a cycle or one or more tasks
/// recorded a failure.
pub fn run_tasks_to_completion(tasks: &[&dyn Task], ctx: &Context, log: &Logger) -> Result<()> {
    let order = graph::execution_order(tasks).context("task dependencies form a cycle")?;

    let mut blocked_by: Option<&str> = None;
    for task in order.into_iter().filter_map(|i| tasks.get(i).copied()) {
        if let Some(name) = blocked_by {
            log.record_task(
                task.name(),
                TaskStatus::Skipped,
                Some(&format!("not run: {name} failed")),
            );
            continue;
        }
        if tasks::execute(task, ctx) == TaskStatus::Failed && task.critical() {
            log.error(&format!(
                "{} failed; stopping before any further change",
                task.name()
            ));
            blocked_by = Some(task.name());
        }
    }

    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} task(s) failed");
    }
    Ok(())
}
